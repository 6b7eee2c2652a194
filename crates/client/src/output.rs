// Output sink: where console content and user-facing status lines go.
//
// Rendering (timestamps, colors) belongs to the front end. The core only
// classifies each line.

use std::sync::Mutex;

/// Classification of a line shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    /// Remote console log output.
    Log,
    /// Remote log output mentioning an error.
    LogError,
    /// Result of an evaluated command.
    Result,
    /// Error reported by the remote service.
    Error,
    /// Content in a category the client does not know, or an unparseable frame.
    Unknown,
    /// Client status ("Connected.", "Reconnecting.").
    Status,
    /// Client-side failure surfaced to the user.
    Failure,
}

impl LineKind {
    /// Whether a front end should highlight this line as an error.
    pub fn is_error(self) -> bool {
        matches!(self, Self::LogError | Self::Error | Self::Unknown | Self::Failure)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub kind: LineKind,
    pub text: String,
}

impl ConsoleLine {
    pub fn new(kind: LineKind, text: impl Into<String>) -> Self {
        Self { kind, text: text.into() }
    }
}

/// Receiver for everything the console wants to show.
pub trait OutputSink: Send + Sync {
    fn emit(&self, line: ConsoleLine);

    fn status(&self, text: &str) {
        self.emit(ConsoleLine::new(LineKind::Status, text));
    }

    fn failure(&self, text: &str) {
        self.emit(ConsoleLine::new(LineKind::Failure, text));
    }
}

/// Sink that keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<ConsoleLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<ConsoleLine> {
        self.lines.lock().map(|lines| lines.clone()).unwrap_or_default()
    }

    /// Text of every line of the given kind, in emission order.
    pub fn texts(&self, kind: LineKind) -> Vec<String> {
        self.lines().into_iter().filter(|line| line.kind == kind).map(|line| line.text).collect()
    }
}

impl OutputSink for MemorySink {
    fn emit(&self, line: ConsoleLine) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}
