// Terminal rendering of console lines.
//
// Every line gets a local timestamp. Error-kind lines are red when stdout is
// a terminal.

use std::io::{self, IsTerminal, Write};

use chrono::{DateTime, Local};
use spc_client::{ConsoleLine, OutputSink};

const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";
const TIMESTAMP_FORMAT: &str = "[%m-%d %H:%M %S]";

pub struct TerminalSink {
    is_tty: bool,
}

impl TerminalSink {
    pub fn stdout() -> Self {
        Self { is_tty: io::stdout().is_terminal() }
    }
}

impl OutputSink for TerminalSink {
    fn emit(&self, line: ConsoleLine) {
        let rendered = render_line(&line, Local::now(), self.is_tty);
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{rendered}");
        let _ = out.flush();
    }
}

fn render_line(line: &ConsoleLine, now: DateTime<Local>, is_tty: bool) -> String {
    let stamp = now.format(TIMESTAMP_FORMAT);
    if is_tty && line.kind.is_error() {
        format!("{ANSI_RED}{stamp} {}{ANSI_RESET}", line.text)
    } else {
        format!("{stamp} {}", line.text)
    }
}
