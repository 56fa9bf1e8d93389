use crate::error::{AnalysisError, Result};
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::path::Path;
use url::Url;

const GRAPH_FILE_PREFIX: &str = "page_graph_";

/// Lowercased host of a URL. Scheme-less or otherwise unparseable input is
/// cut at the first path, query, fragment or port delimiter.
pub fn host_of(url: &str) -> String {
    let host = match Url::parse(url) {
        Ok(parsed) => parsed.host_str().unwrap_or_default().to_string(),
        Err(_) => url
            .split("://")
            .last()
            .unwrap_or(url)
            .split(['/', '?', '#', ':'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Registrable domain of a URL's host, falling back to the bare host when
/// the public suffix list has no answer. An IP address is its own site.
pub fn effective_site(url: &str) -> String {
    let host = host_of(url);
    if is_ip_address(&host) {
        return host;
    }
    match psl::domain_str(&host) {
        Some(domain) => domain.to_string(),
        None => host,
    }
}

fn is_ip_address(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}

/// Who the capture was of and when it ended, recovered from the graph file
/// name `page_graph_<origin with non-word characters as _>_<unix seconds>.graphml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureIdentity {
    pub page_origin: String,
    pub end: DateTime<Utc>,
}

impl CaptureIdentity {
    pub fn new(page_origin: impl Into<String>, end: DateTime<Utc>) -> Self {
        Self {
            page_origin: page_origin.into(),
            end,
        }
    }

    pub fn page_site(&self) -> String {
        effective_site(&self.page_origin)
    }

    pub fn from_graph_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        Self::from_file_name(name).ok_or_else(|| AnalysisError::InvalidCapture {
            dir: path.to_path_buf(),
            reason: format!("graph file name '{}' does not encode origin and timestamp", name),
        })
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".graphml").unwrap_or(name);
        let encoded = &stem[stem.find(GRAPH_FILE_PREFIX)? + GRAPH_FILE_PREFIX.len()..];
        let (origin_part, timestamp) = encoded.rsplit_once('_')?;
        let end = DateTime::from_timestamp(timestamp.parse().ok()?, 0)?;
        Some(Self::new(decode_origin(origin_part)?, end))
    }
}

/// Reverses the file-name encoding of an origin: `___` was `://`, the other
/// underscores were dots, and a numeric last label was a port.
fn decode_origin(encoded: &str) -> Option<String> {
    // A trailing slash on the origin leaves one empty segment behind.
    let encoded = encoded.strip_suffix('_').unwrap_or(encoded);
    if encoded.is_empty() {
        return None;
    }
    let origin = encoded.replace("___", "://").replace('_', ".");
    let Some((head, last)) = origin.rsplit_once('.') else {
        return Some(origin);
    };
    if !last.is_empty() && last.chars().all(|c| c.is_ascii_digit()) {
        return Some(format!("{}:{}", head, last));
    }
    Some(origin)
}
