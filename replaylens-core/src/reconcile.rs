//! Merging the graph's view of a page load's requests with what the proxy
//! and the packet archive saw.

use crate::archive::{ExchangeRecord, PacketKind, PacketRecord, load_har, load_warc};
use crate::capture::CaptureDir;
use crate::console::read_log;
use crate::error::Result;
use crate::site::{CaptureIdentity, effective_site, host_of};
use chrono::{DateTime, Duration, Utc};
use replaylens_graph::{EdgeKind, NodeKind, ProvenanceGraph, load_graphml};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, info};

pub const DEFAULT_GRACE_SECS: i64 = 10;

/// Hosts of the capturing browser's own background traffic.
pub const DEFAULT_INFRASTRUCTURE_HOSTS: [&str; 3] =
    ["brave.com", "brave.software", "bravesoftware.com"];

pub const NO_CONTINUATION: &str = "no continuation";

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Slack added to the capture end before archive records are cut off.
    pub grace: Duration,
    /// Requests to these hosts, or their subdomains, are dropped.
    pub infrastructure_hosts: Vec<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            grace: Duration::seconds(DEFAULT_GRACE_SECS),
            infrastructure_hosts: DEFAULT_INFRASTRUCTURE_HOSTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

impl ReconcileOptions {
    pub fn is_infrastructure(&self, url: &str) -> bool {
        let host = host_of(url);
        self.infrastructure_hosts.iter().any(|h| {
            let h = h.to_ascii_lowercase();
            host == h || host.ends_with(&format!(".{}", h))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestSource {
    Graph,
    Exchanges,
    Packets,
}

impl RequestSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestSource::Graph => "graph",
            RequestSource::Exchanges => "exchanges",
            RequestSource::Packets => "packets",
        }
    }
}

impl fmt::Display for RequestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationRecord {
    /// Capture directory the observation came from; empty when reconciling
    /// records that were not loaded from disk.
    pub directory: String,
    pub url: String,
    pub source: RequestSource,
    pub annotation: String,
    pub request_site: String,
    pub page_site: String,
    pub page_origin: String,
    pub third_party: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeTag {
    Redirect,
    RedirectIframe,
    Report,
    Prefetch,
    Websocket,
    Preflight,
}

impl ExchangeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeTag::Redirect => "redirect",
            ExchangeTag::RedirectIframe => "redirect_iframe",
            ExchangeTag::Report => "report",
            ExchangeTag::Prefetch => "prefetch",
            ExchangeTag::Websocket => "websocket",
            ExchangeTag::Preflight => "preflight",
        }
    }
}

/// What to do with one proxy exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeVerdict {
    Keep(Option<ExchangeTag>),
    /// Service worker fetches never appear in the page's graph.
    Drop,
}

/// Tags an exchange from its request headers. Later checks override earlier
/// tags.
pub fn tag_exchange(record: &ExchangeRecord) -> ExchangeVerdict {
    let mut tag = None;
    if record.is_redirect() {
        if record.has_header_value("Sec-Fetch-Dest", "document") {
            tag = Some(ExchangeTag::Redirect);
        } else if record.has_header_value("Sec-Fetch-Dest", "iframe") {
            tag = Some(ExchangeTag::RedirectIframe);
        }
    }
    if record.has_header_value("Sec-Fetch-Dest", "serviceworker") {
        return ExchangeVerdict::Drop;
    }
    if record.has_header_value("Sec-Fetch-Dest", "report") {
        tag = Some(ExchangeTag::Report);
    }
    if record.has_header_value("Sec-Purpose", "prefetch") {
        tag = Some(ExchangeTag::Prefetch);
    }
    if record.has_header_value("Upgrade", "websocket") {
        tag = Some(ExchangeTag::Websocket);
    }
    if !record.header_values("Access-Control-Request-Method").is_empty() {
        tag = Some(ExchangeTag::Preflight);
    }
    ExchangeVerdict::Keep(tag)
}

/// Recovers the scheme of a graph URL from the console log: whichever of
/// `http://rest` and `https://rest` occurs more often wins, ties go to the
/// one seen first, and no occurrence leaves the URL as it was.
pub fn protocol_majority_vote(console_log: &str, url: &str) -> String {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    if rest.is_empty() {
        return url.to_string();
    }
    let as_http = format!("http://{}", rest);
    let as_https = format!("https://{}", rest);
    let http = console_log.matches(as_http.as_str()).count();
    let https = console_log.matches(as_https.as_str()).count();

    match http.cmp(&https) {
        Ordering::Greater => as_http,
        Ordering::Less => as_https,
        Ordering::Equal if http == 0 => url.to_string(),
        Ordering::Equal => match (console_log.find(&as_http), console_log.find(&as_https)) {
            (Some(h), Some(s)) if s < h => as_https,
            _ => as_http,
        },
    }
}

/// Everything observed about one page load.
pub struct CaptureObservations<'a> {
    pub graph: &'a ProvenanceGraph,
    pub identity: &'a CaptureIdentity,
    pub console_log: &'a str,
    pub exchanges: &'a [ExchangeRecord],
    pub packets: &'a [PacketRecord],
}

pub struct Reconciler {
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(options: ReconcileOptions) -> Self {
        Self { options }
    }

    pub fn cutoff(&self, identity: &CaptureIdentity) -> DateTime<Utc> {
        identity.end + self.options.grace
    }

    pub fn reconcile(&self, obs: &CaptureObservations<'_>) -> Vec<ReconciliationRecord> {
        let cutoff = self.cutoff(obs.identity);
        let page_origin = obs.identity.page_origin.clone();
        let page_site = obs.identity.page_site();
        let record = |url: String, source: RequestSource, annotation: &str| {
            let request_site = effective_site(&url);
            ReconciliationRecord {
                directory: String::new(),
                third_party: request_site != page_site,
                url,
                source,
                annotation: annotation.to_string(),
                request_site,
                page_site: page_site.clone(),
                page_origin: page_origin.clone(),
            }
        };

        let mut records = Vec::new();

        for (url, no_continuation) in graph_requests(obs.graph, obs.console_log) {
            if self.options.is_infrastructure(&url) {
                continue;
            }
            let annotation = if no_continuation { NO_CONTINUATION } else { "" };
            records.push(record(url, RequestSource::Graph, annotation));
        }

        for exchange in obs.exchanges {
            let ExchangeVerdict::Keep(tag) = tag_exchange(exchange) else {
                debug!("Dropping service worker exchange {}", exchange.url);
                continue;
            };
            if exchange.completed() > cutoff || self.options.is_infrastructure(&exchange.url) {
                continue;
            }
            let annotation = tag.map(|t| t.as_str()).unwrap_or("");
            records.push(record(exchange.url.clone(), RequestSource::Exchanges, annotation));
        }

        for packet in obs.packets {
            if !matches!(packet.kind, PacketKind::Response | PacketKind::Revisit)
                || packet.captured > cutoff
                || self.options.is_infrastructure(&packet.target_uri)
            {
                continue;
            }
            records.push(record(packet.target_uri.clone(), RequestSource::Packets, ""));
        }

        info!(
            "Reconciled {} observations for {}",
            records.len(),
            obs.identity.page_origin
        );
        records
    }
}

/// Request URLs the graph knows about, each with a flag set when the request
/// never reached a redirect, completion or error. Frame documents attached to
/// the page are included as completed requests.
pub fn graph_requests(graph: &ProvenanceGraph, console_log: &str) -> Vec<(String, bool)> {
    let mut urls = Vec::new();

    for edge in graph.edges() {
        if !edge.kind().is_request_initiation() {
            continue;
        }
        let Some(url) = edge.target.kind.url().filter(|u| u.starts_with("http")) else {
            continue;
        };
        let continued = graph
            .outgoing(edge.target.id)
            .iter()
            .any(|e| e.kind().is_request_continuation());
        urls.push((protocol_majority_vote(console_log, url), !continued));
    }

    for node in graph.nodes() {
        let NodeKind::DomRoot { url: Some(url), .. } = &node.kind else {
            continue;
        };
        if !url.starts_with("http") {
            continue;
        }
        let attached = graph.incoming(node.id).iter().any(|e| match e.kind() {
            EdgeKind::Structure => true,
            EdgeKind::CreateNode => e.source.kind.is_parser(),
            _ => false,
        });
        if attached {
            urls.push((protocol_majority_vote(console_log, url), false));
        }
    }

    urls
}

/// Loads every artifact of one capture directory and reconciles it.
pub fn reconcile_capture(
    dir: &CaptureDir,
    options: &ReconcileOptions,
) -> Result<Vec<ReconciliationRecord>> {
    let identity = dir.identity()?;
    let graph = load_graphml(&dir.graph_path)?;
    let console_log = read_log(&dir.log_path())?;
    let exchanges = load_har(&dir.har_path)?;
    let packets = load_warc(&dir.warc_path)?;

    let mut records = Reconciler::new(options.clone()).reconcile(&CaptureObservations {
        graph: &graph,
        identity: &identity,
        console_log: &console_log,
        exchanges: &exchanges,
        packets: &packets,
    });
    let directory = dir.name();
    for r in &mut records {
        r.directory = directory.clone();
    }
    Ok(records)
}
