//! Browser console log scanning: instrumentation events and handler tags.

use crate::error::Result;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Marker after which the log describes graph serialization, not the page.
pub const END_OF_PAGE_MARKER: &str = "calling generatePageGraph";

static HWPG_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"INFO:CONSOLE.*\[HWPG\] (.*\}).*", source"#).expect("valid console regex")
});

/// One JSON payload logged by the page-side API hooks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConsoleEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub args: Option<Value>,
}

impl ConsoleEvent {
    /// The call name this event is counted under, `property.event` for
    /// accessors and constructors.
    pub fn call_name(&self) -> Option<String> {
        let property = self.property.as_deref()?;
        match self.event.as_deref() {
            Some(event @ ("get" | "set" | "constructor")) => Some(format!("{}.{}", property, event)),
            _ => Some(property.to_string()),
        }
    }
}

/// Parses one raw log line. Lines that are not instrumentation output, or
/// whose payload is not valid JSON, are skipped.
pub fn parse_console_line(line: &str) -> Option<ConsoleEvent> {
    if !line.contains("[HWPG] {") {
        return None;
    }
    let payload = HWPG_LINE.captures(line)?.get(1)?.as_str();
    match serde_json::from_str::<ConsoleEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("Skipping unparseable console payload: {}", e);
            None
        }
    }
}

/// All `log` events up to the end-of-page marker.
pub fn console_events(text: &str) -> Vec<ConsoleEvent> {
    text.lines()
        .take_while(|l| *l != END_OF_PAGE_MARKER)
        .filter_map(parse_console_line)
        .filter(|e| e.kind == "log")
        .collect()
}

/// Occurrences per call name.
pub fn api_call_counts(text: &str) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for event in console_events(text) {
        if let Some(name) = event.call_name() {
            *counts.entry(name).or_insert(0) += 1;
        }
    }
    counts
}

/// Console lines tagged by the handler instrumentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerTagCounts {
    pub inline_handler: u64,
    pub prog_handler: u64,
    pub on_attr_handler: u64,
}

pub fn handler_tag_counts(text: &str) -> HandlerTagCounts {
    let mut counts = HandlerTagCounts::default();
    for line in text.lines().filter(|l| l.contains("INFO:CONSOLE")) {
        if line.contains(r#""tag":"inline_handler"#) {
            counts.inline_handler += 1;
        }
        if line.contains(r#""tag":"prog_handler"#) {
            counts.prog_handler += 1;
        }
        if line.contains(r#""tag":"on_attr_handler"#) {
            counts.on_attr_handler += 1;
        }
    }
    counts
}

/// Reads a log leniently; captures may contain bytes that are not UTF-8.
pub fn read_log(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
