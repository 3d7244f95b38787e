use std::io::{self, IsTerminal, Write};

use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::report::{ReportEvent, ReportSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Interactive,
    Plain,
    Json,
}

impl OutputMode {
    pub fn detect(non_interactive: bool) -> Self {
        if non_interactive {
            OutputMode::Json
        } else if io::stdout().is_terminal() {
            OutputMode::Interactive
        } else {
            OutputMode::Plain
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

impl ReportSink for JsonOutput {
    fn report(&self, _event: ReportEvent<'_>) {}
}
