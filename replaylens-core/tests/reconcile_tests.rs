// Tests for cross-source request reconciliation

use chrono::{DateTime, Duration, Utc};
use replaylens_core::archive::{ExchangeRecord, PacketKind, PacketRecord};
use replaylens_core::reconcile::{
    graph_requests, protocol_majority_vote, tag_exchange, CaptureObservations, ExchangeTag,
    ExchangeVerdict, NO_CONTINUATION,
};
use replaylens_core::site::CaptureIdentity;
use replaylens_core::{ReconcileOptions, ReconciliationRecord, Reconciler, RequestSource};
use replaylens_graph::{EdgeKind, GraphBuilder, NodeId, ProvenanceGraph};
use std::collections::BTreeSet;

const PAGE: &str = "https://www.example.com/";
const APP: &str = "https://www.example.com/app.js";
const LIB: &str = "https://cdn.example.net/lib.js";
const ICON: &str = "https://www.example.com/favicon.ico";

fn end() -> DateTime<Utc> {
    // 2025-01-12T20:33:00Z
    DateTime::from_timestamp(1_736_713_980, 0).unwrap()
}

fn identity() -> CaptureIdentity {
    CaptureIdentity::new("https://www.example.com", end())
}

fn start_request(b: &mut GraphBuilder, requester: NodeId, url: &str, completed: bool) -> NodeId {
    let resource = b.resource(url);
    b.edge(
        requester,
        resource,
        EdgeKind::RequestStart {
            request_id: None,
            resource_type: None,
        },
    );
    if completed {
        b.edge(
            resource,
            requester,
            EdgeKind::RequestComplete {
                request_id: None,
                resource_type: "Script".to_string(),
                response_hash: None,
            },
        );
    }
    resource
}

fn graph_of(urls: &[&str]) -> ProvenanceGraph {
    let mut b = GraphBuilder::new();
    let parser = b.parser();
    for url in urls {
        start_request(&mut b, parser, url, true);
    }
    b.build().unwrap()
}

fn exchange(url: &str, headers: &[(&str, &str)]) -> ExchangeRecord {
    ExchangeRecord {
        url: url.to_string(),
        started: end() - Duration::seconds(5),
        duration: Duration::milliseconds(120),
        request_headers: headers
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect(),
        redirect_url: String::new(),
    }
}

fn packet(url: &str, kind: PacketKind) -> PacketRecord {
    PacketRecord {
        target_uri: url.to_string(),
        captured: end(),
        kind,
    }
}

fn reconcile(
    graph: &ProvenanceGraph,
    console_log: &str,
    exchanges: &[ExchangeRecord],
    packets: &[PacketRecord],
) -> Vec<ReconciliationRecord> {
    let identity = identity();
    Reconciler::new(ReconcileOptions::default()).reconcile(&CaptureObservations {
        graph,
        identity: &identity,
        console_log,
        exchanges,
        packets,
    })
}

fn urls_from(records: &[ReconciliationRecord], source: RequestSource) -> Vec<&str> {
    records
        .iter()
        .filter(|r| r.source == source)
        .map(|r| r.url.as_str())
        .collect()
}

// ============================================================================
// Merge Tests
// ============================================================================

#[test]
fn test_three_sources_merge() {
    let graph = graph_of(&[PAGE, APP, LIB]);
    let exchanges = [exchange(APP, &[]), exchange(LIB, &[]), exchange(ICON, &[])];
    let packets = [packet(LIB, PacketKind::Response)];

    let records = reconcile(&graph, "", &exchanges, &packets);

    assert_eq!(records.len(), 7);
    let distinct: BTreeSet<&str> = records.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(distinct.len(), 4);

    assert_eq!(urls_from(&records, RequestSource::Graph), vec![PAGE, APP, LIB]);
    assert_eq!(urls_from(&records, RequestSource::Exchanges), vec![APP, LIB, ICON]);
    assert_eq!(urls_from(&records, RequestSource::Packets), vec![LIB]);
}

#[test]
fn test_sites_and_third_party_flag() {
    let graph = graph_of(&[APP, LIB]);
    let records = reconcile(&graph, "", &[], &[]);

    assert_eq!(records[0].request_site, "example.com");
    assert_eq!(records[0].page_site, "example.com");
    assert_eq!(records[0].page_origin, "https://www.example.com");
    assert!(!records[0].third_party);

    assert_eq!(records[1].request_site, "example.net");
    assert!(records[1].third_party);
}

#[test]
fn test_archive_records_after_grace_window_dropped() {
    let graph = graph_of(&[]);
    let mut late = exchange(APP, &[]);
    late.started = end() + Duration::seconds(9);
    late.duration = Duration::seconds(2);
    let on_time = exchange(LIB, &[]);
    let mut late_packet = packet(ICON, PacketKind::Response);
    late_packet.captured = end() + Duration::seconds(11);
    let edge_packet = packet(APP, PacketKind::Response);

    let records = reconcile(
        &graph,
        "",
        &[late, on_time],
        &[late_packet, packet(LIB, PacketKind::Revisit), edge_packet],
    );

    assert_eq!(urls_from(&records, RequestSource::Exchanges), vec![LIB]);
    assert_eq!(urls_from(&records, RequestSource::Packets), vec![LIB, APP]);
}

#[test]
fn test_grace_is_configurable() {
    let graph = graph_of(&[]);
    let mut late = exchange(APP, &[]);
    late.started = end() + Duration::seconds(20);
    let identity = identity();
    let options = ReconcileOptions {
        grace: Duration::seconds(60),
        ..ReconcileOptions::default()
    };

    let records = Reconciler::new(options).reconcile(&CaptureObservations {
        graph: &graph,
        identity: &identity,
        console_log: "",
        exchanges: &[late],
        packets: &[],
    });
    assert_eq!(records.len(), 1);
}

#[test]
fn test_only_response_and_revisit_packets_kept() {
    let graph = graph_of(&[]);
    let packets = [
        packet(APP, PacketKind::Response),
        packet(LIB, PacketKind::Revisit),
        packet(ICON, PacketKind::Other),
    ];
    let records = reconcile(&graph, "", &[], &packets);
    assert_eq!(urls_from(&records, RequestSource::Packets), vec![APP, LIB]);
}

#[test]
fn test_infrastructure_hosts_filtered_everywhere() {
    let update = "https://go-updater.brave.com/check";
    let graph = graph_of(&[update, APP]);
    let records = reconcile(
        &graph,
        "",
        &[exchange("https://variations.brave.software/seed", &[])],
        &[packet("https://static1.bravesoftware.com/x", PacketKind::Response)],
    );

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url, APP);
}

#[test]
fn test_non_http_graph_urls_dropped() {
    let graph = graph_of(&["data:image/png;base64,AAAA", "blob:https://www.example.com/1", APP]);
    let records = reconcile(&graph, "", &[], &[]);
    assert_eq!(urls_from(&records, RequestSource::Graph), vec![APP]);
}

#[test]
fn test_non_http_graph_urls_never_gain_a_scheme_from_the_log() {
    let data = "data:image/png;base64,AAAA";
    let graph = graph_of(&[data, APP]);
    let log = format!("[x] https://{} https://{}", data, data);

    assert_eq!(graph_requests(&graph, &log), vec![(APP.to_string(), false)]);
    let records = reconcile(&graph, &log, &[], &[]);
    assert_eq!(urls_from(&records, RequestSource::Graph), vec![APP]);
}

#[test]
fn test_distinct_ip_hosts_are_third_party() {
    let graph = graph_of(&["http://10.0.0.1/app.js", "http://127.0.0.1/local.js"]);
    let identity = CaptureIdentity::new("http://127.0.0.1:8000", end());
    let records = Reconciler::new(ReconcileOptions::default()).reconcile(&CaptureObservations {
        graph: &graph,
        identity: &identity,
        console_log: "",
        exchanges: &[],
        packets: &[],
    });

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].request_site, "10.0.0.1");
    assert_eq!(records[0].page_site, "127.0.0.1");
    assert!(records[0].third_party);
    assert!(!records[1].third_party);
}

// ============================================================================
// Annotation Tests
// ============================================================================

#[test]
fn test_request_without_continuation_is_annotated() {
    let mut b = GraphBuilder::new();
    let parser = b.parser();
    start_request(&mut b, parser, APP, true);
    start_request(&mut b, parser, LIB, false);
    let graph = b.build().unwrap();

    let records = reconcile(&graph, "", &[], &[]);
    assert_eq!(records[0].annotation, "");
    assert_eq!(records[1].annotation, NO_CONTINUATION);
}

#[test]
fn test_exchange_tags() {
    let mut redirect = exchange(PAGE, &[("sec-fetch-dest", "document")]);
    redirect.redirect_url = "https://example.com/".to_string();
    assert_eq!(tag_exchange(&redirect), ExchangeVerdict::Keep(Some(ExchangeTag::Redirect)));

    let mut frame = exchange(PAGE, &[("Sec-Fetch-Dest", "iframe")]);
    frame.redirect_url = "https://example.com/".to_string();
    assert_eq!(
        tag_exchange(&frame),
        ExchangeVerdict::Keep(Some(ExchangeTag::RedirectIframe))
    );

    let cases = [
        (("Sec-Fetch-Dest", "report"), ExchangeTag::Report),
        (("Sec-Purpose", "prefetch"), ExchangeTag::Prefetch),
        (("Upgrade", "websocket"), ExchangeTag::Websocket),
        (("Access-Control-Request-Method", "POST"), ExchangeTag::Preflight),
    ];
    for (header, tag) in cases {
        assert_eq!(
            tag_exchange(&exchange(APP, &[header])),
            ExchangeVerdict::Keep(Some(tag))
        );
    }

    assert_eq!(tag_exchange(&exchange(APP, &[])), ExchangeVerdict::Keep(None));
}

#[test]
fn test_later_exchange_tag_wins() {
    let record = exchange(
        APP,
        &[
            ("Sec-Fetch-Dest", "report"),
            ("Access-Control-Request-Method", "GET"),
        ],
    );
    assert_eq!(tag_exchange(&record), ExchangeVerdict::Keep(Some(ExchangeTag::Preflight)));
}

#[test]
fn test_service_worker_exchanges_dropped() {
    let graph = graph_of(&[]);
    let worker = exchange(APP, &[("Sec-Fetch-Dest", "serviceworker")]);
    let records = reconcile(&graph, "", &[worker, exchange(LIB, &[])], &[]);

    assert_eq!(urls_from(&records, RequestSource::Exchanges), vec![LIB]);
}

#[test]
fn test_exchange_annotation_uses_tag() {
    let graph = graph_of(&[]);
    let records = reconcile(
        &graph,
        "",
        &[exchange(APP, &[("Sec-Purpose", "prefetch")])],
        &[],
    );
    assert_eq!(records[0].annotation, "prefetch");
}

// ============================================================================
// Frame Document Tests
// ============================================================================

#[test]
fn test_attached_frame_documents_included() {
    let mut b = GraphBuilder::new();
    let parser = b.parser();
    let frame = b.dom_root("https://ads.example.org/frame.html", 10);
    let _detached = b.dom_root("https://widgets.example.org/unused.html", 11);
    let blank = b.dom_root("about:blank", 12);
    b.edge(parser, frame, EdgeKind::CreateNode);
    b.edge(parser, blank, EdgeKind::CreateNode);
    let graph = b.build().unwrap();

    let requests = graph_requests(&graph, "");
    assert_eq!(
        requests,
        vec![("https://ads.example.org/frame.html".to_string(), false)]
    );
}

#[test]
fn test_frame_document_attached_by_structure() {
    let mut b = GraphBuilder::new();
    let owner = b.element("DIV", 3);
    let frame = b.dom_root("https://ads.example.org/frame.html", 10);
    b.edge(owner, frame, EdgeKind::Structure);
    let graph = b.build().unwrap();

    assert_eq!(graph_requests(&graph, "").len(), 1);
}

// ============================================================================
// Protocol Vote Tests
// ============================================================================

#[test]
fn test_protocol_vote_majority() {
    let log = "GET https://cdn.example.net/lib.js\nGET http://cdn.example.net/lib.js\nGET https://cdn.example.net/lib.js";
    assert_eq!(
        protocol_majority_vote(log, "http://cdn.example.net/lib.js"),
        "https://cdn.example.net/lib.js"
    );
}

#[test]
fn test_protocol_vote_tie_keeps_first_seen() {
    let log = "http://cdn.example.net/lib.js then https://cdn.example.net/lib.js";
    assert_eq!(
        protocol_majority_vote(log, "https://cdn.example.net/lib.js"),
        "http://cdn.example.net/lib.js"
    );
}

#[test]
fn test_protocol_vote_without_evidence_keeps_url() {
    assert_eq!(
        protocol_majority_vote("nothing here", "http://cdn.example.net/lib.js"),
        "http://cdn.example.net/lib.js"
    );
}

#[test]
fn test_protocol_vote_matches_url_literally() {
    // The `?` and `.` must match literally.
    let log = "https://cdn.example.net/a.js?v=1 http://cdn.example.net/aXjs?v=1";
    assert_eq!(
        protocol_majority_vote(log, "http://cdn.example.net/a.js?v=1"),
        "https://cdn.example.net/a.js?v=1"
    );
}

#[test]
fn test_protocol_vote_applied_to_graph_urls() {
    let graph = graph_of(&["http://cdn.example.net/lib.js"]);
    let log = "[x] loaded https://cdn.example.net/lib.js";
    let records = reconcile(&graph, log, &[], &[]);
    assert_eq!(records[0].url, LIB);
}
