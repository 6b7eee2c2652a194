// Message Router: turns inbound push frames into classified output lines,
// diverting sentinel-tagged result lines to the index builder.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use spc_common::protocol::frame::{Category, Entries, Envelope, InboundFrame, Payload};
use tracing::{debug, trace, warn};

use crate::autocomplete::IndexBuilder;
use crate::output::{ConsoleLine, LineKind, OutputSink};

pub struct MessageRouter {
    output: Arc<dyn OutputSink>,
    definitions: Option<Arc<IndexBuilder>>,
}

impl MessageRouter {
    pub fn new(output: Arc<dyn OutputSink>) -> Self {
        Self { output, definitions: None }
    }

    /// Hand sentinel-tagged result lines to `builder` instead of the output.
    pub fn with_definitions(mut self, builder: Arc<IndexBuilder>) -> Self {
        self.definitions = Some(builder);
        self
    }

    pub fn route(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::Envelope(envelope) => self.route_envelope(envelope),
            InboundFrame::Metadata(line) => trace!(line, "metadata frame"),
            InboundFrame::Malformed(text) | InboundFrame::Unknown(text) => {
                warn!(frame = %text, "unrecognized push frame");
                self.emit(LineKind::Unknown, format!("Unknown message: {text}"));
            }
            InboundFrame::AuthOk(_) | InboundFrame::AuthFailed => {
                debug!("handshake frame reached the router");
            }
        }
    }

    fn route_envelope(&self, envelope: Envelope) {
        trace!(subscription = %envelope.subscription, sections = envelope.sections.len(), "envelope");
        for (general, payload) in envelope.sections {
            match payload {
                Payload::Text(text) | Payload::Scalar(text) => {
                    self.deliver(&Category::from_name(&general), text);
                }
                Payload::Grouped(groups) => {
                    for (specific, entries) in groups {
                        if entries.is_empty() {
                            continue;
                        }
                        let category = Category::for_pair(&general, &specific);
                        match entries {
                            Entries::Lines(lines) => {
                                for line in lines {
                                    self.deliver(&category, line);
                                }
                            }
                            Entries::Single(text) => self.deliver(&category, text),
                        }
                    }
                }
                Payload::Empty => {}
            }
        }
    }

    fn deliver(&self, category: &Category, text: String) {
        match category {
            Category::Result => {
                for line in text.split('\n') {
                    match &self.definitions {
                        Some(builder) if builder.is_definition(line) => builder.load_definition(line),
                        _ if is_script_block(line) => {}
                        _ => self.emit(LineKind::Result, line),
                    }
                }
            }
            Category::Log if is_script_block(&text) => {}
            Category::Log if mentions_error(&text) => self.emit(LineKind::LogError, text),
            Category::Log => self.emit(LineKind::Log, text),
            Category::Error => self.emit(LineKind::Error, format!("[error!] {text}")),
            Category::Unknown(name) => {
                self.emit(LineKind::Unknown, format!("[unknown type! {name}] {text}"));
            }
        }
    }

    fn emit(&self, kind: LineKind, text: impl Into<String>) {
        self.output.emit(ConsoleLine::new(kind, text));
    }
}

fn is_script_block(text: &str) -> bool {
    static SCRIPT: OnceLock<Regex> = OnceLock::new();
    SCRIPT
        .get_or_init(|| {
            Regex::new(r"(?i)^\s*<script>.*</script>").expect("script block pattern should compile")
        })
        .is_match(text)
}

fn mentions_error(text: &str) -> bool {
    static ERROR: OnceLock<Regex> = OnceLock::new();
    ERROR
        .get_or_init(|| Regex::new(r"(?i)error").expect("error pattern should compile"))
        .is_match(text)
}
