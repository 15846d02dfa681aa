use crate::config::{ActionConfig, Cli};
use crate::logging::test_support::{CapturedLogs, capture};
use crate::pipeline::{self, Pipeline};
use async_trait::async_trait;
use broker_auth::{GitHubActionsIdentity, IdentityError, IdentityProvider};
use broker_core::{Error, SecretMasker, SecretValue, ServiceConfiguration, ServiceKind};
use broker_provision::ProvisionRequest;
use broker_provision::testing::{MemoryRuntime, RecordingRunner, RuntimeEvent};
use clap::Parser;
use serde_json::json;
use std::process::ExitCode;
use std::sync::Mutex;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Identity provider that hands out a fixed token and remembers audiences.
struct FixedIdentity {
    token: &'static str,
    audiences: Mutex<Vec<String>>,
}

impl FixedIdentity {
    fn new(token: &'static str) -> Self {
        Self {
            token,
            audiences: Mutex::new(Vec::new()),
        }
    }

    fn audiences(&self) -> Vec<String> {
        self.audiences.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for FixedIdentity {
    async fn fetch(&self, audience: &str) -> Result<SecretValue, IdentityError> {
        self.audiences.lock().unwrap().push(audience.to_string());
        Ok(SecretValue::new(self.token))
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn config(
    service: ServiceKind,
    token_server: &str,
    inputs: ServiceConfiguration,
    provision: ProvisionRequest,
) -> ActionConfig {
    ActionConfig {
        service,
        token_server: token_server.to_string(),
        inputs,
        provision,
        identity_token: None,
    }
}

fn env_only() -> ProvisionRequest {
    ProvisionRequest {
        configure_git: false,
        configure_env: true,
    }
}

fn cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("token-broker").chain(args.iter().copied())).unwrap()
}

fn failures(runtime: &MemoryRuntime) -> Vec<String> {
    runtime
        .events()
        .into_iter()
        .filter_map(|e| match e {
            RuntimeEvent::Fail(message) => Some(message),
            _ => None,
        })
        .collect()
}

async fn broker_issuing(token: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exchange"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": token})))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_github_end_to_end() {
    let masker = SecretMasker::new();
    let logs = CapturedLogs::default();
    let _guard = capture(masker.clone(), logs.clone());

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exchange"))
        .and(body_json(json!({"caller_identity": "idtok123", "service": "github"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "ghs_abc"})))
        .expect(1)
        .mount(&server)
        .await;

    let runtime = MemoryRuntime::with_masker(masker);
    let identity = FixedIdentity::new("idtok123");
    let runner = RecordingRunner::new();
    let config = config(
        ServiceKind::Github,
        &server.uri(),
        ServiceConfiguration::new(),
        env_only(),
    );

    let credential = Pipeline::new(&runtime, &identity, &runner)
        .run(&config)
        .await
        .unwrap();

    assert_eq!(credential.expose(), "ghs_abc");
    assert_eq!(identity.audiences(), vec![server.uri()]);
    assert_eq!(runtime.env()["GITHUB_TOKEN"], "ghs_abc");
    assert_eq!(runtime.outputs()["access-token"], "ghs_abc");
    assert!(runner.calls().is_empty());

    let logs = logs.contents();
    assert!(logs.contains("Received access token"));
    assert!(!logs.contains("ghs_abc"));
    assert!(!logs.contains("idtok123"));
}

#[tokio::test]
async fn test_secrets_registered_before_use() {
    let server = broker_issuing("ghs_abc").await;
    let runtime = MemoryRuntime::new();
    let identity = FixedIdentity::new("idtok123");
    let runner = RecordingRunner::new();
    let config = config(
        ServiceKind::Github,
        &server.uri(),
        ServiceConfiguration::new(),
        ProvisionRequest {
            configure_git: true,
            configure_env: true,
        },
    );

    Pipeline::new(&runtime, &identity, &runner)
        .run(&config)
        .await
        .unwrap();

    let events = runtime.events();
    let position = |event: &RuntimeEvent| events.iter().position(|e| e == event).unwrap();

    let identity_masked = position(&RuntimeEvent::Mask("idtok123".into()));
    let credential_masked = position(&RuntimeEvent::Mask("ghs_abc".into()));
    let output_set = position(&RuntimeEvent::Output("access-token".into()));
    let env_exported = position(&RuntimeEvent::Export("GITHUB_TOKEN".into()));

    assert!(identity_masked < credential_masked);
    assert!(credential_masked < output_set);
    assert!(output_set < env_exported);
    assert_eq!(runner.calls().len(), 2);
}

#[tokio::test]
async fn test_oxide_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exchange"))
        .and(body_json(json!({
            "caller_identity": "idtok123",
            "service": "oxide",
            "silo": "https://corp.sys.example",
            "duration": 3600,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "oxide-token-xyz"})))
        .expect(1)
        .mount(&server)
        .await;

    let runtime = MemoryRuntime::new();
    let identity = FixedIdentity::new("idtok123");
    let runner = RecordingRunner::new();
    let inputs = ServiceConfiguration::new()
        .with("silo", "https://corp.sys.example")
        .with("duration", "3600");
    let config = config(ServiceKind::Oxide, &server.uri(), inputs, env_only());

    Pipeline::new(&runtime, &identity, &runner)
        .run(&config)
        .await
        .unwrap();

    let env = runtime.env();
    assert_eq!(env["OXIDE_HOST"], "https://corp.sys.example");
    assert_eq!(env["OXIDE_TOKEN"], "oxide-token-xyz");
}

#[tokio::test]
async fn test_configuration_error_before_any_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let runtime = MemoryRuntime::new();
    let identity = FixedIdentity::new("idtok123");
    let runner = RecordingRunner::new();
    let inputs = ServiceConfiguration::new()
        .with("silo", "s")
        .with("duration", "60")
        .with("repositories", "octo/repo");
    let config = config(ServiceKind::Oxide, &server.uri(), inputs, env_only());

    let err = Pipeline::new(&runtime, &identity, &runner)
        .run(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(
        err.to_string(),
        "input repositories is only supported when the service is github"
    );
    assert!(identity.audiences().is_empty());
    assert!(runtime.events().is_empty());
}

#[tokio::test]
async fn test_broker_rejection_stops_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exchange"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"message": "bad silo"})))
        .mount(&server)
        .await;

    let runtime = MemoryRuntime::new();
    let identity = FixedIdentity::new("idtok123");
    let runner = RecordingRunner::new();
    let inputs = ServiceConfiguration::new()
        .with("silo", "nope")
        .with("duration", "60");
    let config = config(ServiceKind::Oxide, &server.uri(), inputs, env_only());

    let err = Pipeline::new(&runtime, &identity, &runner)
        .run(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Exchange(_)));
    assert_eq!(
        err.to_string(),
        "fetching the token failed with status code 400: bad silo"
    );
    assert!(runtime.outputs().is_empty());
    assert!(runtime.env().is_empty());
}

#[tokio::test]
async fn test_git_for_oxide_is_a_provisioning_error() {
    let server = broker_issuing("oxide-token-xyz").await;
    let runtime = MemoryRuntime::new();
    let identity = FixedIdentity::new("idtok123");
    let runner = RecordingRunner::new();
    let inputs = ServiceConfiguration::new()
        .with("silo", "s")
        .with("duration", "60");
    let config = config(
        ServiceKind::Oxide,
        &server.uri(),
        inputs,
        ProvisionRequest {
            configure_git: true,
            configure_env: true,
        },
    );

    let err = Pipeline::new(&runtime, &identity, &runner)
        .run(&config)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Provisioning(_)));
    assert!(runner.calls().is_empty());
    assert!(runtime.env().is_empty());
}

#[tokio::test]
async fn test_no_provisioning_unless_requested() {
    let server = broker_issuing("ghs_abc").await;
    let runtime = MemoryRuntime::new();
    let identity = FixedIdentity::new("idtok123");
    let runner = RecordingRunner::new();
    let config = config(
        ServiceKind::Github,
        &server.uri(),
        ServiceConfiguration::new().with("permissions", "contents:read"),
        ProvisionRequest::default(),
    );

    Pipeline::new(&runtime, &identity, &runner)
        .run(&config)
        .await
        .unwrap();

    assert_eq!(runtime.outputs()["access-token"], "ghs_abc");
    assert!(runtime.env().is_empty());
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_rejected_run_fails_the_step_once_with_masked_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/exchange"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"message": "caller idtok123 is not allowed"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let runtime = MemoryRuntime::new();
    let runner = RecordingRunner::new();
    let args = cli(&[
        "--service",
        "github",
        "--token-server",
        &server.uri(),
        "--identity-token",
        "idtok123",
        "--configure-env",
        "true",
    ]);

    let code = crate::run(args, &runtime, &runner).await;

    assert_eq!(code, ExitCode::FAILURE);
    assert!(runtime.is_masked("idtok123"));
    assert_eq!(
        failures(&runtime),
        vec!["fetching the token failed with status code 400: caller *** is not allowed"]
    );
    assert!(matches!(runtime.events().last(), Some(RuntimeEvent::Fail(_))));
    assert!(
        !runtime
            .events()
            .iter()
            .any(|e| matches!(e, RuntimeEvent::Output(_) | RuntimeEvent::Export(_)))
    );
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_provisioning_failure_is_reported_last() {
    let server = broker_issuing("oxide-token-xyz").await;
    let runtime = MemoryRuntime::new();
    let identity = FixedIdentity::new("idtok123");
    let runner = RecordingRunner::new();
    let inputs = ServiceConfiguration::new()
        .with("silo", "s")
        .with("duration", "60");
    let config = config(
        ServiceKind::Oxide,
        &server.uri(),
        inputs,
        ProvisionRequest {
            configure_git: true,
            configure_env: true,
        },
    );

    let result = Pipeline::new(&runtime, &identity, &runner).run(&config).await;
    let code = pipeline::report(&runtime, result);

    assert_eq!(code, ExitCode::FAILURE);
    let failures = failures(&runtime);
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("git"), "{}", failures[0]);
    assert!(!failures[0].contains("oxide-token-xyz"));

    let events = runtime.events();
    let fail_at = events
        .iter()
        .position(|e| matches!(e, RuntimeEvent::Fail(_)))
        .unwrap();
    assert_eq!(fail_at, events.len() - 1);
    assert!(!events[..fail_at].iter().any(|e| matches!(e, RuntimeEvent::Export(_))));
}

#[tokio::test]
async fn test_successful_run_reports_nothing() {
    let server = broker_issuing("ghs_abc").await;
    let runtime = MemoryRuntime::new();
    let runner = RecordingRunner::new();
    let args = cli(&[
        "--service",
        "github",
        "--token-server",
        &server.uri(),
        "--identity-token",
        "idtok123",
    ]);

    let code = crate::run(args, &runtime, &runner).await;

    assert_eq!(code, ExitCode::SUCCESS);
    assert!(failures(&runtime).is_empty());
    assert_eq!(runtime.outputs()["access-token"], "ghs_abc");
}

#[tokio::test]
async fn test_configuration_error_wins_over_unavailable_runner_identity() {
    let runtime = MemoryRuntime::new();
    let identity = GitHubActionsIdentity::from_vars(None, None);
    let runner = RecordingRunner::new();
    let config = config(
        ServiceKind::Oxide,
        "https://broker.example",
        ServiceConfiguration::new().with("duration", "60"),
        env_only(),
    );

    let result = Pipeline::new(&runtime, &identity, &runner).run(&config).await;

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(
        err.to_string(),
        "input silo is required when the service is oxide"
    );
}

#[tokio::test]
async fn test_unavailable_runner_identity_fails_before_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let runtime = MemoryRuntime::new();
    let identity = GitHubActionsIdentity::from_vars(None, None);
    let runner = RecordingRunner::new();
    let config = config(
        ServiceKind::Github,
        &server.uri(),
        ServiceConfiguration::new(),
        env_only(),
    );

    let result = Pipeline::new(&runtime, &identity, &runner).run(&config).await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Identity(_)));
    assert!(err.to_string().contains("id-token: write"), "{}", err);

    assert_eq!(pipeline::report(&runtime, Err::<(), _>(err)), ExitCode::FAILURE);
    assert_eq!(failures(&runtime).len(), 1);
    assert!(runtime.outputs().is_empty());
}
