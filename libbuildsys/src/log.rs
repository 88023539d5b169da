//! Writer-backed build logging.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use termcolor::{Ansi, Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// A build log writing to an arbitrary sink.
///
/// Clones share the underlying sink, which lets the same sink serve both the
/// buildpack's own log lines and the stdout/stderr streams of executed build
/// commands without interleaving partial writes.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Logger {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// A logger for interactive buildpack output on the process' stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(StandardStream::stdout(ColorChoice::Always))
    }

    /// Writes a styled section header.
    pub fn header(&self, title: impl AsRef<str>) -> io::Result<()> {
        self.write_styled_message(
            &format!("\n[{}]", title.as_ref()),
            ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true),
        )
    }

    /// Writes an indented line of body output.
    pub fn body(&self, message: impl AsRef<str>) -> io::Result<()> {
        let mut writer = self.writer();
        writeln!(writer, "  {}", message.as_ref())?;
        writer.flush()
    }

    /// A cloneable handle to the underlying sink, suitable as an output sink
    /// for [`Execution`](crate::execution::Execution).
    #[must_use]
    pub fn writer(&self) -> LogWriter {
        LogWriter {
            sink: Arc::clone(&self.sink),
        }
    }

    // Styles each line of text separately, so that when buildpack output is streamed to the
    // user (and prefixes like `remote:` added) the line colour doesn't leak into the prefixes.
    fn write_styled_message(&self, message: &str, spec: &ColorSpec) -> io::Result<()> {
        let mut stream = Ansi::new(self.writer());
        for line in message.split('\n') {
            stream.set_color(spec)?;
            write!(stream, "{line}")?;
            stream.reset()?;
            writeln!(stream)?;
        }
        stream.flush()
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::stdout()
    }
}

/// Write handle produced by [`Logger::writer`].
pub struct LogWriter {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}
