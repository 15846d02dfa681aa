//! Log setup.
//!
//! Every formatted event is buffered and passed through the shared
//! [`SecretMasker`] before it reaches the underlying writer, so a secret
//! registered at any point is redacted from every later log line.

use crate::config::LogFormat;
use broker_core::SecretMasker;
use std::io::{self, Write};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// Wraps a [`MakeWriter`] so that its output is redacted.
#[derive(Clone)]
pub struct MaskingMakeWriter<M> {
    masker: SecretMasker,
    inner: M,
}

impl<M> MaskingMakeWriter<M> {
    pub fn new(masker: SecretMasker, inner: M) -> Self {
        Self { masker, inner }
    }
}

impl<'a, M> MakeWriter<'a> for MaskingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = MaskingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        MaskingWriter {
            masker: self.masker.clone(),
            inner: self.inner.make_writer(),
            buf: Vec::new(),
        }
    }
}

/// Buffers one event and writes it out, redacted, when dropped.
pub struct MaskingWriter<W: Write> {
    masker: SecretMasker,
    inner: W,
    buf: Vec<u8>,
}

impl<W: Write> MaskingWriter<W> {
    fn flush_masked(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let masked = self.masker.mask(&String::from_utf8_lossy(&self.buf));
        self.buf.clear();
        self.inner.write_all(masked.as_bytes())?;
        self.inner.flush()
    }
}

impl<W: Write> Write for MaskingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    // Flushing mid-event could split a secret across two masking passes, so
    // output is only emitted once the event is complete.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: Write> Drop for MaskingWriter<W> {
    fn drop(&mut self) {
        let _ = self.flush_masked();
    }
}

/// Install the global subscriber.
pub fn init(masker: SecretMasker, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let writer = MaskingMakeWriter::new(masker, io::stdout);

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .init(),
    }
}
