//! Parsed records from the two network archives of a capture, and readers
//! for the HAR and WARC files they come from.

use crate::error::{AnalysisError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// One HTTP exchange recorded by the proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRecord {
    pub url: String,
    pub started: DateTime<Utc>,
    pub duration: Duration,
    pub request_headers: Vec<(String, String)>,
    /// Empty when the response was not a redirect.
    pub redirect_url: String,
}

impl ExchangeRecord {
    pub fn completed(&self) -> DateTime<Utc> {
        self.started + self.duration
    }

    /// Values of every request header named `name`, ignoring case.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.request_headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn has_header_value(&self, name: &str, value: &str) -> bool {
        self.header_values(name).iter().any(|v| *v == value)
    }

    pub fn is_redirect(&self) -> bool {
        !self.redirect_url.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Response,
    Revisit,
    Other,
}

impl PacketKind {
    pub fn parse(warc_type: &str) -> Self {
        match warc_type.trim().to_ascii_lowercase().as_str() {
            "response" => PacketKind::Response,
            "revisit" => PacketKind::Revisit,
            _ => PacketKind::Other,
        }
    }
}

/// One WARC record header.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketRecord {
    pub target_uri: String,
    pub captured: DateTime<Utc>,
    pub kind: PacketKind,
}

#[derive(Deserialize)]
struct HarFile {
    log: HarLog,
}

#[derive(Deserialize)]
struct HarLog {
    #[serde(default)]
    pages: Vec<HarPage>,
    #[serde(default)]
    entries: Vec<HarEntry>,
}

#[derive(Deserialize)]
struct HarPage {
    id: String,
}

#[derive(Deserialize)]
struct HarEntry {
    #[serde(default)]
    pageref: Option<String>,
    #[serde(rename = "startedDateTime")]
    started: String,
    #[serde(default)]
    time: f64,
    request: HarRequest,
    #[serde(default)]
    response: HarResponse,
}

#[derive(Deserialize)]
struct HarRequest {
    url: String,
    #[serde(default)]
    headers: Vec<HarHeader>,
}

#[derive(Deserialize)]
struct HarHeader {
    name: String,
    value: String,
}

#[derive(Deserialize, Default)]
struct HarResponse {
    #[serde(default, rename = "redirectURL")]
    redirect_url: String,
}

pub fn load_har(path: &Path) -> Result<Vec<ExchangeRecord>> {
    let text = fs::read_to_string(path)?;
    parse_har(&text, path)
}

/// Entries of the first page, or every entry when the archive declares no
/// pages.
pub fn parse_har(text: &str, path: &Path) -> Result<Vec<ExchangeRecord>> {
    let har: HarFile = serde_json::from_str(text).map_err(|e| AnalysisError::ArchiveParse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let first_page = har.log.pages.first().map(|p| p.id.clone());

    let mut records = Vec::new();
    for entry in har.log.entries {
        if let Some(page) = &first_page {
            if entry.pageref.as_deref() != Some(page.as_str()) {
                continue;
            }
        }
        let started = DateTime::parse_from_rfc3339(&entry.started)
            .map_err(|e| AnalysisError::ArchiveParse {
                path: path.to_path_buf(),
                reason: format!("bad startedDateTime '{}': {}", entry.started, e),
            })?
            .with_timezone(&Utc);
        records.push(ExchangeRecord {
            url: entry.request.url,
            started,
            duration: Duration::microseconds((entry.time.max(0.0) * 1000.0) as i64),
            request_headers: entry
                .request
                .headers
                .into_iter()
                .map(|h| (h.name, h.value))
                .collect(),
            redirect_url: entry.response.redirect_url,
        });
    }
    debug!("Read {} exchanges from {}", records.len(), path.display());
    Ok(records)
}

pub fn load_warc(path: &Path) -> Result<Vec<PacketRecord>> {
    let bytes = fs::read(path)?;
    parse_warc(&bytes, path)
}

/// Reads record headers from an uncompressed WARC, skipping each block by
/// its `Content-Length`.
pub fn parse_warc(bytes: &[u8], path: &Path) -> Result<Vec<PacketRecord>> {
    let parse_error = |reason: String| AnalysisError::ArchiveParse {
        path: path.to_path_buf(),
        reason,
    };
    if bytes.starts_with(&[0x1f, 0x8b]) {
        return Err(parse_error("compressed WARC files are not supported".to_string()));
    }

    let mut records = Vec::new();
    let mut pos = 0;
    loop {
        while pos < bytes.len() && matches!(bytes[pos], b'\r' | b'\n') {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let (version, next) = read_line(bytes, pos);
        if !version.starts_with("WARC/") {
            return Err(parse_error(format!("expected WARC version line at byte {}", pos)));
        }
        pos = next;

        let mut headers: HashMap<String, String> = HashMap::new();
        while pos < bytes.len() {
            let (line, next) = read_line(bytes, pos);
            pos = next;
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let length = match headers.get("content-length") {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|_| parse_error(format!("bad Content-Length '{}'", raw)))?,
            None => 0,
        };
        pos = pos.saturating_add(length).min(bytes.len());

        let kind = headers
            .get("warc-type")
            .map(|t| PacketKind::parse(t))
            .unwrap_or(PacketKind::Other);
        let (Some(uri), Some(date)) = (headers.get("warc-target-uri"), headers.get("warc-date")) else {
            if kind != PacketKind::Other {
                warn!("Skipping {:?} record without target URI or date", kind);
            }
            continue;
        };
        let captured = DateTime::parse_from_rfc3339(date)
            .map_err(|e| parse_error(format!("bad WARC-Date '{}': {}", date, e)))?
            .with_timezone(&Utc);
        records.push(PacketRecord {
            target_uri: uri.trim_start_matches('<').trim_end_matches('>').to_string(),
            captured,
            kind,
        });
    }
    debug!("Read {} WARC records from {}", records.len(), path.display());
    Ok(records)
}

fn read_line(bytes: &[u8], pos: usize) -> (String, usize) {
    let end = bytes[pos..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|i| pos + i)
        .unwrap_or(bytes.len());
    let mut line = &bytes[pos..end];
    if line.last() == Some(&b'\r') {
        line = &line[..line.len() - 1];
    }
    (String::from_utf8_lossy(line).into_owned(), (end + 1).min(bytes.len()))
}
