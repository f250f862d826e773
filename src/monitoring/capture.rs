//! Per-invocation capture of diagnostic output.
//!
//! A forecast call runs under a scoped `tracing` subscriber whose writer tees
//! every formatted event into an in-memory buffer and (optionally) stderr.
//! Whatever the backend logged is handed back to the caller as text.

use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing::Level;

/// Free text accumulated during one forecast invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DiagnosticLog(String);

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.contains(needle)
    }

    pub fn push_line(&mut self, line: &str) {
        if !self.0.is_empty() && !self.0.ends_with('\n') {
            self.0.push('\n');
        }
        self.0.push_str(line);
    }

    /// At most `max_chars` characters, with `...` appended when cut.
    pub fn truncated(&self, max_chars: usize) -> String {
        match self.0.char_indices().nth(max_chars) {
            Some((cut, _)) => format!("{}...", &self.0[..cut]),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for DiagnosticLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DiagnosticLog {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DiagnosticLog {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    level: Level,
    echo: bool,
}

impl LogCapture {
    pub fn new(level: Level) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            level,
            echo: true,
        }
    }

    /// Keep captured output off stderr.
    pub fn quiet(mut self) -> Self {
        self.echo = false;
        self
    }

    /// Run `f` with this thread's tracing output teed into the buffer.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let buffer = Arc::clone(&self.buffer);
        let echo = self.echo;
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || TeeWriter {
                buffer: Arc::clone(&buffer),
                echo,
            })
            .with_max_level(self.level)
            .with_ansi(false)
            .with_target(false)
            .finish();

        tracing::subscriber::with_default(subscriber, f)
    }

    /// Append text directly, outside of any tracing event.
    pub fn append(&self, text: &str) {
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        if !buffer.is_empty() && !buffer.ends_with(b"\n") {
            buffer.push(b'\n');
        }
        buffer.extend_from_slice(text.as_bytes());
    }

    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }

    pub fn finish(self) -> DiagnosticLog {
        DiagnosticLog(self.contents())
    }
}

struct TeeWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
    echo: bool,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        if self.echo {
            io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.echo {
            io::stderr().flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_events_and_returns_value() {
        let capture = LogCapture::new(Level::INFO).quiet();

        let value = capture.run(|| {
            tracing::info!("fitting zero-shot model");
            tracing::debug!("too chatty");
            42
        });

        let log = capture.finish();
        assert_eq!(value, 42);
        assert!(log.contains("fitting zero-shot model"));
        assert!(!log.contains("too chatty"));
    }

    #[test]
    fn test_append_separates_lines() {
        let capture = LogCapture::new(Level::INFO).quiet();
        capture.append("first");
        capture.append("Exception: boom");
        assert_eq!(capture.contents(), "first\nException: boom");
    }

    #[test]
    fn test_truncated_respects_char_boundaries() {
        let log = DiagnosticLog::from("héllo wörld");
        assert_eq!(log.truncated(5), "héllo...");
        assert_eq!(log.truncated(100), "héllo wörld");
    }

    #[test]
    fn test_push_line() {
        let mut log = DiagnosticLog::new();
        log.push_line("a");
        log.push_line("b");
        assert_eq!(log.as_str(), "a\nb");
    }
}
