//! This module tests the components one by one: parsing, candidates and
//! generators, fingerprints, the heuristics, and output formatting.
//! End-to-end scans against a mock server live in `scenarios`.


use crate::candidate::{Candidate, Severity, join_url, normalize_url};
use crate::config::{REJECTED_STATUS_CODES, ScanConfig};
use crate::engine::{CancelSignal, Engine, build_client};
use crate::entry::{Entry, ProbeKind, Response, Special, decode_text, directory_of};
use crate::error::{RequestError, ScanError};
use crate::fingerprint::{Fingerprint, hamming_distance, simhash, tokenize};
use crate::generator::{DATA_SUFFIXES, EXECUTABLE_SUFFIXES, FileGenerator, PathGenerator, SeenSet};
use crate::heuristics::{
    DeadHostDetection, DetectBehaviorChange, DetectSoft404, DynamicTimeout, FilterRequestFromURL,
    HarDocument, Heuristic, IgnoreLargeBody, LogBehaviorChange, MatchString, RejectSoft404,
    RejectStatusCode, StoreHar, blank_name, build_chain, side_chain, suspicious_redirect,
};
use crate::output::{FoundEvent, Level, Reporter};
use crate::parser::*;
use crate::plugins::parse_robots;
use crate::similarity::ratio;
use crate::singleflight::SingleFlight;
use crate::target::Target;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderValue, LOCATION, RANGE};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// Helper function to create an entry that already holds a response
fn entry_with_response(url: &str, kind: ProbeKind, code: u16, body: &str) -> Entry {
    let mut entry = Entry::new(
        Url::parse(url).unwrap(),
        Candidate::new("/x", "test entry", Severity::Warning),
        kind,
    );
    let mut response = Response::new(code, HeaderMap::new());
    response.set_body(body.as_bytes().to_vec());
    entry.response = Some(response);
    entry
}

fn found_event() -> FoundEvent {
    FoundEvent {
        description: "admin panel".to_string(),
        url: "http://t/admin/".to_string(),
        code: 404,
        severity: Severity::Warning,
        special: Some(Special::TomcatRedirect),
        prefix: "Tomcat redirect, ".to_string(),
    }
}

// PARSER TESTS
#[test]
fn test_parse_dictionary_sections() {
    let content = r#"[
        {"data": [
            {"url": "/admin", "description": "admin panel", "severity": "warning"},
            {"url": "backup/", "description": "backups", "severity": "high", "handle_redirect": true}
        ]},
        {"data": [
            {"url": "/db", "description": "dump", "no_suffix": true, "match_string": "INSERT INTO"},
            {"url": "/.DS_Store", "match_bytes": "00000001 42756431"}
        ]}
    ]"#;

    let dictionary = parse_dictionary(content).unwrap();
    assert!(dictionary.skipped.is_empty());
    assert_eq!(dictionary.candidates.len(), 4);

    let urls: Vec<&str> = dictionary.candidates.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(urls, vec!["/admin", "/backup", "/db", "/.DS_Store"]);
    assert_eq!(dictionary.candidates[1].severity, Severity::High);
    assert!(dictionary.candidates[1].handle_redirect);
    assert!(dictionary.candidates[2].no_suffix);
    assert_eq!(
        dictionary.candidates[2].match_string.as_deref(),
        Some("INSERT INTO")
    );
    assert_eq!(
        dictionary.candidates[3].match_bytes,
        Some(vec![0, 0, 0, 1, 0x42, 0x75, 0x64, 0x31])
    );
    // Severity defaults to warning
    assert_eq!(dictionary.candidates[3].severity, Severity::Warning);
}

#[test]
fn test_parse_dictionary_skips_malformed_entries() {
    let content = r#"[{"data": [
        {"url": "/ok"},
        {"description": "no url"},
        {"url": "/bad", "match_bytes": "zz"},
        {"url": "/bad-severity", "severity": "catastrophic"},
        {"url": "   "}
    ]}]"#;

    let dictionary = parse_dictionary(content).unwrap();
    assert_eq!(dictionary.candidates.len(), 1);
    assert_eq!(dictionary.candidates[0].url, "/ok");
    assert_eq!(dictionary.skipped.len(), 4);
    assert!(dictionary.skipped[0].starts_with("section 0, entry 1"));
}

#[test]
fn test_parse_dictionary_not_a_list() {
    assert!(parse_dictionary(r#"{"data": []}"#).is_err());
    assert!(parse_dictionary("not json").is_err());
}

#[test]
fn test_load_dictionary_missing_file() {
    let result = load_dictionary(std::path::Path::new("/nonexistent/softbuster/paths.json"));
    assert!(matches!(result, Err(ScanError::Dictionary { .. })));
}

#[test]
fn test_load_bundled_dictionaries() {
    let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    for name in ["data/paths.json", "data/files.json"] {
        let dictionary = load_dictionary(&root.join(name)).unwrap();
        assert!(!dictionary.candidates.is_empty(), "{name} is empty");
        assert!(dictionary.skipped.is_empty(), "{name}: {:?}", dictionary.skipped);
    }
}

#[test]
fn test_decode_hex() {
    assert_eq!(decode_hex("00ff10").unwrap(), vec![0x00, 0xff, 0x10]);
    assert_eq!(decode_hex("DE AD").unwrap(), vec![0xde, 0xad]);
    assert!(decode_hex("abc").is_err());
    assert!(decode_hex("gg").is_err());
}

#[test]
fn test_parse_cookie_header() {
    assert_eq!(parse_cookie_header("Cookie: a=1; b=2\n"), "a=1; b=2");
    assert_eq!(parse_cookie_header("cookie:a=1;\nb=2"), "a=1; b=2");
    assert_eq!(parse_cookie_header("session=abc"), "session=abc");
}

#[tokio::test]
async fn test_parse_cookie_file() {
    let path = std::env::temp_dir().join(format!("softbuster-cookie-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, "Cookie: PHPSESSID=deadbeef\n").await.unwrap();

    assert_eq!(parse_cookie_file(&path).unwrap(), "PHPSESSID=deadbeef");

    tokio::fs::remove_file(&path).await.unwrap();
}

#[test]
fn test_parse_plugin_options() {
    let options = vec![
        "robots:nofollow".to_string(),
        "Robots:save".to_string(),
        "sitemap:depth=2".to_string(),
        "malformed".to_string(),
    ];

    let result = parse_plugin_options(&options);
    assert_eq!(result.len(), 2);
    assert_eq!(
        result.get("robots"),
        Some(&vec!["nofollow".to_string(), "save".to_string()])
    );
    assert_eq!(result.get("sitemap"), Some(&vec!["depth=2".to_string()]));
}

// CANDIDATE AND TARGET TESTS
#[test]
fn test_normalize_url() {
    assert_eq!(normalize_url("/admin/"), "/admin");
    assert_eq!(normalize_url("admin"), "/admin");
    assert_eq!(normalize_url("/"), "/");
    assert_eq!(normalize_url(""), "/");
    assert_eq!(normalize_url(" /a/b// "), "/a/b");
}

#[test]
fn test_join_url() {
    assert_eq!(join_url("/", "/admin"), "/admin");
    assert_eq!(join_url("/a", "/b/"), "/a/b");
    assert_eq!(join_url("/a", "/"), "/a");
}

#[test]
fn test_target_parse_and_urls() {
    let target = Target::parse("example.com").unwrap();
    assert_eq!(target.scheme, "http");
    assert_eq!(target.port, 80);
    assert_eq!(target.base_url(), "http://example.com/");
    assert_eq!(target.directory_url("/"), "http://example.com/");
    assert_eq!(target.directory_url("/admin"), "http://example.com/admin/");
    assert_eq!(target.file_url("/db.sql"), "http://example.com/db.sql");

    let target = Target::parse("https://example.com:8443/app").unwrap();
    assert_eq!(target.base_url(), "https://example.com:8443/app/");
    assert_eq!(target.file_url("/x.php"), "https://example.com:8443/app/x.php");
}

#[test]
fn test_target_rejects_unsupported_scheme() {
    assert!(matches!(
        Target::parse("ftp://example.com"),
        Err(ScanError::InvalidTarget(..))
    ));
}

#[test]
fn test_directory_of() {
    let url = Url::parse("http://t/admin/").unwrap();
    assert_eq!(directory_of(&url), "http://t/");
    let url = Url::parse("http://t/admin/db.sql").unwrap();
    assert_eq!(directory_of(&url), "http://t/admin/");
    let url = Url::parse("http://t/").unwrap();
    assert_eq!(directory_of(&url), "http://t/");
}

#[test]
fn test_decode_text_truncated_character() {
    let mut raw = "héllo".as_bytes().to_vec();
    assert_eq!(decode_text(&raw).as_deref(), Some("héllo"));
    raw.truncate(2); // cuts 'é' in half
    assert_eq!(decode_text(&raw).as_deref(), Some("h"));
    assert_eq!(decode_text(&[0xff, 0xfe, b'a']), None);
}

#[test]
fn test_exit_codes() {
    assert_eq!(ScanError::HostUnreachable("t:80".into()).exit_code(), 2);
    assert_eq!(ScanError::Resolve("t".into()).exit_code(), 1);
}

// GENERATOR TESTS
fn candidates(urls: &[&str]) -> Vec<Candidate> {
    urls.iter()
        .map(|u| Candidate::new(u, "test", Severity::Warning))
        .collect()
}

#[test]
fn test_path_generator_first_call() {
    let paths = candidates(&["/", "/admin", "/backup"]);
    let mut files = candidates(&["/db", "/backup", "/.htpasswd"]);
    files[2].no_suffix = true;

    let mut generator = PathGenerator::new(paths, files, true);
    let mut seen = SeenSet::new();
    let batch = generator.generate(&[Candidate::root()], &mut seen);

    let urls: Vec<&str> = batch.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(urls, vec!["/admin", "/backup", "/db"]);
}

#[test]
fn test_path_generator_without_file_as_path() {
    let mut generator =
        PathGenerator::new(candidates(&["/admin"]), candidates(&["/db"]), false);
    let batch = generator.generate(&[Candidate::root()], &mut SeenSet::new());
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].url, "/admin");
}

#[test]
fn test_path_generator_recursive_product() {
    let mut generator = PathGenerator::new(candidates(&["/", "/a", "/b"]), Vec::new(), true);
    let mut seen = SeenSet::new();

    let first = generator.generate(&[Candidate::root()], &mut seen);
    assert_eq!(first.len(), 2);

    let valid = vec![Candidate::root(), first[0].clone()];
    let second = generator.generate(&valid, &mut seen);
    let urls: Vec<&str> = second.iter().map(|c| c.url.as_str()).collect();
    assert_eq!(urls, vec!["/a/a", "/a/b"]);
}

#[test]
fn test_generators_never_repeat_a_url() {
    let paths = candidates(&["/a", "/b", "/a/", "b"]);
    let files = candidates(&["/a", "/c"]);
    let mut path_generator = PathGenerator::new(paths, files.clone(), true);
    let file_generator = FileGenerator::new(files);
    let mut seen = SeenSet::new();

    let mut directories = Vec::new();
    let mut valid = vec![Candidate::root()];
    for _ in 0..4 {
        let batch = path_generator.generate(&valid, &mut seen);
        directories.extend(batch.iter().map(|c| c.url.clone()));
        valid.extend(batch);
    }
    let mut files = Vec::new();
    for _ in 0..2 {
        files.extend(
            file_generator
                .generate(&valid, &mut seen)
                .into_iter()
                .map(|c| c.url),
        );
    }

    let unique: HashSet<&String> = directories.iter().collect();
    assert_eq!(unique.len(), directories.len());
    let unique: HashSet<&String> = files.iter().collect();
    assert_eq!(unique.len(), files.len());
}

#[test]
fn test_file_generator_suffixes() {
    let mut files = candidates(&["/db", "/index", "/.env"]);
    files[1].executable = true;
    files[2].no_suffix = true;

    let generator = FileGenerator::new(files);
    let mut seen = SeenSet::new();
    let valid = vec![Candidate::root(), Candidate::new("/admin", "admin", Severity::Warning)];
    let batch = generator.generate(&valid, &mut seen);

    let per_directory = DATA_SUFFIXES.len() + EXECUTABLE_SUFFIXES.len() + 1;
    assert_eq!(batch.len(), per_directory * 2);

    let urls: HashSet<&str> = batch.iter().map(|c| c.url.as_str()).collect();
    assert!(urls.contains("/db.sql"));
    assert!(urls.contains("/db.tar.gz"));
    assert!(urls.contains("/db~"));
    assert!(urls.contains("/index.php"));
    assert!(urls.contains("/admin/index.cfm"));
    assert!(urls.contains("/admin/.env"));
    assert!(!urls.contains("/.env.bak"));
    assert!(!urls.contains("/index.sql"));

    assert!(generator.generate(&valid, &mut seen).is_empty());
}

#[test]
fn test_seen_set_normalizes_urls() {
    let mut seen = SeenSet::new();
    assert!(seen.insert("/db.sql/"));
    assert!(!seen.insert("/db.sql"));
    assert!(seen.contains("db.sql"));
    assert_eq!(seen.len(), 1);
}

#[test]
fn test_file_as_path_is_not_probed_twice() {
    let files = candidates(&["/db"]);
    let mut path_generator = PathGenerator::new(Vec::new(), files.clone(), true);
    let file_generator = FileGenerator::new(files);
    let mut seen = SeenSet::new();

    let root = [Candidate::root()];
    let mut produced: Vec<String> = path_generator
        .generate(&root, &mut seen)
        .into_iter()
        .map(|c| c.url)
        .collect();
    produced.extend(
        file_generator
            .generate(&root, &mut seen)
            .into_iter()
            .map(|c| c.url),
    );

    let db = produced.iter().filter(|url| normalize_url(url) == "/db").count();
    assert_eq!(db, 1);
    assert_eq!(produced.len(), DATA_SUFFIXES.len());
    let unique: HashSet<String> = produced.iter().map(|url| normalize_url(url)).collect();
    assert_eq!(unique.len(), produced.len());
}

// FINGERPRINT AND SIMILARITY TESTS
#[test]
fn test_tokenize_drops_stop_words() {
    assert_eq!(
        tokenize("The Page <div>was NOT found</div>"),
        vec!["page", "not", "found"]
    );
}

#[test]
fn test_fingerprint_identical_bodies_match() {
    let body = b"<html><body><h1>Not Found</h1><p>The requested URL was not found on this server.</p></body></html>";
    let a = Fingerprint::from_body(body, 5120);
    let b = Fingerprint::from_body(body, 5120);
    assert!(a.matches(&b));
    assert_eq!(a.similarity(&b), 1.0);
}

#[test]
fn test_fingerprint_different_bodies_do_not_match() {
    let a = Fingerprint::from_body(
        b"Welcome to the administration console, please sign in with your operator account",
        5120,
    );
    let b = Fingerprint::from_body(
        b"Quarterly revenue report listing regional sales figures and projected growth numbers",
        5120,
    );
    assert!(!a.matches(&b));
}

#[test]
fn test_fingerprint_uses_sample_prefix_only() {
    let mut body = "word ".repeat(20).into_bytes();
    let sample_len = body.len();
    let exact = Fingerprint::from_body(&body, sample_len);
    body.extend_from_slice(b"completely different trailing content beyond the sample");
    let longer = Fingerprint::from_body(&body, sample_len);
    assert_eq!(exact, longer);
}

#[test]
fn test_fingerprint_trims_whitespace() {
    let a = Fingerprint::from_body(b"\r\n  soft not found page  \n", 5120);
    let b = Fingerprint::from_body(b"soft not found page", 5120);
    assert_eq!(a, b);
}

#[test]
fn test_fingerprint_binary_body_uses_md5() {
    let body = [0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];
    let fingerprint = Fingerprint::from_body(&body, 5120);
    assert!(matches!(fingerprint, Fingerprint::Md5(_)));
    assert!(fingerprint.matches(&Fingerprint::from_body(&body, 5120)));
    assert!(!fingerprint.matches(&Fingerprint::from_body(b"text", 5120)));
}

#[test]
fn test_simhash_empty_text() {
    assert_eq!(simhash(""), 0);
    assert_eq!(simhash("the a of"), 0);
    assert_eq!(hamming_distance(0, u64::MAX), 64);
}

#[test]
fn test_ratio() {
    assert_eq!(ratio("", ""), 1.0);
    assert_eq!(ratio("abc", "abc"), 1.0);
    assert_eq!(ratio("abc", "xyz"), 0.0);
    assert!((ratio("abcd", "bcde") - 0.75).abs() < 1e-9);
}

// SINGLE-FLIGHT TESTS
#[tokio::test]
async fn test_single_flight_runs_init_once() {
    let flight: Arc<SingleFlight<usize>> = Arc::new(SingleFlight::new());
    let calls = Arc::new(AtomicUsize::new(0));

    let tasks = (0..10).map(|_| {
        let flight = flight.clone();
        let calls = calls.clone();
        async move {
            flight
                .get_or_init("dir", || async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    calls.fetch_add(1, Ordering::SeqCst) + 42
                })
                .await
        }
    });
    let values = futures::future::join_all(tasks).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|v| *v == 42));
    assert_eq!(flight.len().await, 1);
    assert_eq!(flight.get("dir").await, Some(42));
    assert_eq!(flight.get("other").await, None);
}

// HEURISTIC TESTS
#[tokio::test]
async fn test_dynamic_timeout_doubles_up_to_max() {
    let timeout = DynamicTimeout::new(
        Duration::from_millis(500),
        Duration::from_secs(2),
        Duration::from_secs(10),
    );
    let mut entry = entry_with_response("http://t/a", ProbeKind::File, 200, "");
    let host = entry.host();

    timeout.before_request(&mut entry).await.unwrap();
    assert_eq!(entry.request.timeout, Some(Duration::from_secs(2)));

    timeout.on_timeout(&mut entry).await.unwrap();
    assert_eq!(timeout.current(&host).await, Duration::from_secs(4));
    for _ in 0..5 {
        timeout.on_timeout(&mut entry).await.unwrap();
    }
    assert_eq!(timeout.current(&host).await, Duration::from_secs(10));
}

#[tokio::test]
async fn test_dynamic_timeout_follows_fast_responses() {
    let timeout = DynamicTimeout::new(
        Duration::from_millis(500),
        Duration::from_secs(2),
        Duration::from_secs(10),
    );
    let mut entry = entry_with_response("http://t/a", ProbeKind::File, 200, "");
    entry.response.as_mut().unwrap().elapsed = Duration::from_millis(20);
    let host = entry.host();

    for _ in 0..30 {
        timeout.on_request_successful(&mut entry).await.unwrap();
    }
    let current = timeout.current(&host).await;
    assert!(current < Duration::from_secs(2));
    assert!(current >= Duration::from_millis(500));
}

#[tokio::test]
async fn test_dynamic_timeout_tracks_response_round_trip() {
    let timeout = DynamicTimeout::new(
        Duration::from_millis(500),
        Duration::from_secs(2),
        Duration::from_secs(10),
    );
    let mut slow = entry_with_response("http://slow/a", ProbeKind::File, 200, "");
    slow.response.as_mut().unwrap().elapsed = Duration::from_secs(3);
    let mut fast = entry_with_response("http://fast/a", ProbeKind::File, 200, "");
    fast.response.as_mut().unwrap().elapsed = Duration::from_millis(20);

    for _ in 0..30 {
        timeout.on_request_successful(&mut slow).await.unwrap();
        timeout.on_request_successful(&mut fast).await.unwrap();
    }
    assert!(timeout.current(&slow.host()).await > Duration::from_secs(8));
    assert!(timeout.current(&fast.host()).await < Duration::from_millis(510));
}

#[tokio::test]
async fn test_dead_host_detection_threshold_and_reset() {
    let detection = DeadHostDetection::new(3, Arc::new(Reporter::silent()));
    let mut entry = entry_with_response("http://t:8080/a", ProbeKind::File, 200, "");

    assert!(detection.on_timeout(&mut entry).await.is_ok());
    assert!(detection.on_timeout(&mut entry).await.is_ok());
    assert_eq!(detection.failures("t:8080").await, 2);

    detection.after_headers(&mut entry).await.unwrap();
    assert_eq!(detection.failures("t:8080").await, 0);

    detection.on_timeout(&mut entry).await.unwrap();
    detection.on_timeout(&mut entry).await.unwrap();
    assert_eq!(
        detection.on_timeout(&mut entry).await,
        Err(RequestError::HostUnreachable("t:8080".to_string()))
    );
}

#[tokio::test]
async fn test_filter_request_from_url() {
    let filter = FilterRequestFromURL::new(HashSet::from(["Target.Example".to_string()]));

    let mut allowed = entry_with_response("http://target.example/a", ProbeKind::File, 200, "");
    assert!(filter.before_request(&mut allowed).await.is_ok());

    let mut foreign = entry_with_response("http://evil.example/a", ProbeKind::Side, 200, "");
    assert!(matches!(
        filter.before_request(&mut foreign).await,
        Err(RequestError::Rejected(_))
    ));
}

#[tokio::test]
async fn test_reject_status_code_tomcat_exemption() {
    let reject = RejectStatusCode::new(REJECTED_STATUS_CODES);
    let tomcat_body = "<h3>Apache Tomcat/9.0.41</h3>";

    let mut directory = entry_with_response("http://t/admin/", ProbeKind::Directory, 404, tomcat_body);
    assert!(reject.after_response(&mut directory).await.is_ok());

    let mut file = entry_with_response("http://t/admin.php", ProbeKind::File, 404, tomcat_body);
    assert!(reject.after_response(&mut file).await.is_err());

    let mut plain = entry_with_response("http://t/x/", ProbeKind::Directory, 404, "nope");
    assert!(reject.after_response(&mut plain).await.is_err());

    let mut gateway = entry_with_response("http://t/x/", ProbeKind::Directory, 502, "");
    assert!(reject.after_response(&mut gateway).await.is_err());

    let mut ok = entry_with_response("http://t/x/", ProbeKind::Directory, 403, "");
    assert!(reject.after_response(&mut ok).await.is_ok());
}

#[tokio::test]
async fn test_match_string_and_bytes() {
    let mut entry = entry_with_response("http://t/db.sql", ProbeKind::File, 200, "-- dump\nINSERT INTO users");
    entry.candidate.match_string = Some("INSERT INTO".to_string());
    MatchString.after_response(&mut entry).await.unwrap();
    assert!(entry.result.string_match);

    entry.candidate.match_string = None;
    entry.candidate.match_bytes = Some(b"dump".to_vec());
    MatchString.after_response(&mut entry).await.unwrap();
    assert!(entry.result.string_match);

    entry.candidate.match_bytes = Some(b"DROP TABLE".to_vec());
    MatchString.after_response(&mut entry).await.unwrap();
    assert!(!entry.result.string_match);
}

#[tokio::test]
async fn test_string_match_overrides_soft404() {
    let mut entry = entry_with_response("http://t/db.sql", ProbeKind::File, 200, "x");
    entry.result.soft404 = true;
    assert!(RejectSoft404.on_request_successful(&mut entry).await.is_err());

    entry.result.string_match = true;
    assert!(RejectSoft404.on_request_successful(&mut entry).await.is_ok());
}

#[tokio::test]
async fn test_ignore_large_body() {
    let large = IgnoreLargeBody::new(8);
    let mut entry = entry_with_response("http://t/big", ProbeKind::File, 206, "0123456789abcdef");

    large.before_request(&mut entry).await.unwrap();
    assert_eq!(
        entry.request.headers.get(RANGE),
        Some(&HeaderValue::from_static("bytes=0-7"))
    );

    large.after_headers(&mut entry).await.unwrap();
    large.after_response(&mut entry).await.unwrap();
    let response = entry.response.as_ref().unwrap();
    assert_eq!(response.code, 200);
    assert_eq!(response.raw, b"01234567");
    assert_eq!(response.text(), "01234567");
}

#[tokio::test]
async fn test_behavior_change_flags_uniform_responses() {
    let detector = DetectBehaviorChange::new(3, 0.8, 5120);
    let blocked = "Access denied by the web application firewall, request blocked";

    let mut flagged = Vec::new();
    for i in 0..5 {
        let mut entry = entry_with_response(&format!("http://t/{i}"), ProbeKind::File, 403, blocked);
        detector.after_response(&mut entry).await.unwrap();
        flagged.push(entry.result.error_behavior);
    }
    assert_eq!(flagged, vec![false, false, false, true, true]);
    assert_eq!(detector.buffered().await, 3);

    let mut different = entry_with_response(
        "http://t/ok",
        ProbeKind::File,
        200,
        "Quarterly revenue report listing regional sales figures and projected growth",
    );
    detector.after_response(&mut different).await.unwrap();
    assert!(!different.result.error_behavior);
    assert_eq!(detector.buffered().await, 1);
}

#[tokio::test]
async fn test_behavior_change_ignores_side_requests() {
    let detector = DetectBehaviorChange::new(1, 0.8, 5120);
    for _ in 0..3 {
        let mut entry = entry_with_response("http://t/side", ProbeKind::Side, 200, "same");
        detector.after_response(&mut entry).await.unwrap();
        assert!(!entry.result.error_behavior);
    }
    assert_eq!(detector.buffered().await, 0);
}

#[tokio::test]
async fn test_behavior_change_skips_soft404_rejections() {
    let detector = DetectBehaviorChange::new(2, 0.8, 5120);
    let logger = LogBehaviorChange::new(Arc::new(Reporter::silent()));
    let not_found = "Sorry, the page you requested was not found on this server";

    for i in 0..4 {
        let mut entry = entry_with_response(&format!("http://t/{i}"), ProbeKind::File, 200, not_found);
        entry.result.soft404 = true;
        detector.after_response(&mut entry).await.unwrap();
        logger.after_response(&mut entry).await.unwrap();
        assert!(!entry.result.error_behavior);
    }
    assert_eq!(detector.buffered().await, 0);

    let mut matched = entry_with_response("http://t/db.sql", ProbeKind::File, 200, not_found);
    matched.result.soft404 = true;
    matched.result.string_match = true;
    detector.after_response(&mut matched).await.unwrap();
    assert_eq!(detector.buffered().await, 1);
}

#[test]
fn test_suspicious_redirect() {

    let source = Url::parse("http://t/foo/").unwrap();

    let error_page = Url::parse("http://t/404.php").unwrap();
    assert!(suspicious_redirect(&source, &error_page).is_some());

    let not_found = Url::parse("http://t/Not_Found").unwrap();
    assert!(suspicious_redirect(&source, &not_found).is_some());

    let unrelated = Url::parse("http://t/login?next=home").unwrap();
    assert!(suspicious_redirect(&source, &unrelated).is_some());

    let slash = Url::parse("http://t/foo/").unwrap();
    assert!(suspicious_redirect(&Url::parse("http://t/foo").unwrap(), &slash).is_none());

    let deeper = Url::parse("http://t/foo/index").unwrap();
    assert!(suspicious_redirect(&source, &deeper).is_some());

    // 404 must be a whole number, not part of one
    let order = Url::parse("http://t/foo/14045/").unwrap();
    assert!(suspicious_redirect(&Url::parse("http://t/foo/1404/").unwrap(), &order).is_none());
}

#[test]
fn test_blank_name_leaves_scheme_and_host() {
    let short = Url::parse("http://t/t/").unwrap();
    let blanked = blank_name(&short, "t");
    let rest = blanked.strip_prefix("http://t/").unwrap();
    assert!(!rest.contains('t'));

    let login = Url::parse("http://t/login?next=/t/&from=t").unwrap();
    let blanked = blank_name(&login, "t");
    let rest = blanked.strip_prefix("http://t/login?").unwrap();
    assert!(!rest.contains("/t/"));
    assert!(rest.ends_with("from="));

    let attic = Url::parse("http://t/attic/").unwrap();
    assert_eq!(blank_name(&attic, "t"), "http://t/attic/");
}

#[test]
fn test_har_document_from_entry() {
    let mut entry = entry_with_response("http://t/admin/", ProbeKind::Directory, 301, "moved");
    if let Some(response) = entry.response.as_mut() {
        response.headers.insert(LOCATION, HeaderValue::from_static("/admin/login"));
    }

    let document = HarDocument::from_entry(&entry).unwrap();
    let json = serde_json::to_value(&document).unwrap();
    let har_entry = &json["log"]["entries"][0];
    assert_eq!(json["log"]["version"], "1.2");
    assert_eq!(har_entry["request"]["method"], "GET");
    assert_eq!(har_entry["request"]["url"], "http://t/admin/");
    assert_eq!(har_entry["response"]["status"], 301);
    assert_eq!(har_entry["response"]["content"]["text"], "moved");
    assert_eq!(har_entry["response"]["redirectURL"], "/admin/login");

    let empty = Entry::side(Url::parse("http://t/").unwrap());
    assert!(HarDocument::from_entry(&empty).is_none());
}

#[tokio::test]
async fn test_store_har_reports_write_failure() {
    let blocker = std::env::temp_dir().join(format!("softbuster-har-file-{}", uuid::Uuid::new_v4()));
    std::fs::write(&blocker, b"not a directory").unwrap();
    let reporter = Arc::new(Reporter::silent());
    let store = StoreHar::new(blocker.clone(), reporter.clone());

    let mut entry = entry_with_response("http://t/a/", ProbeKind::Directory, 200, "index");
    assert!(store.on_request_successful(&mut entry).await.is_ok());
    assert!(entry.result.har_location.is_none());
    assert_eq!(reporter.error_count(), 1);
    let _ = std::fs::remove_file(&blocker);
}

#[test]
fn test_parse_robots() {
    let robots = "User-agent: *\n\
                  Disallow: /admin/\n\
                  Disallow: /private*.php$\n\
                  Allow: /public # comment\n\
                  disallow: /admin\n\
                  Disallow:\n\
                  Disallow: /\n\
                  Sitemap: http://t/sitemap.xml\n";
    assert_eq!(
        parse_robots(robots),
        vec!["/admin", "/private.php", "/public"]
    );
}

#[tokio::test]
async fn test_chain_order() {
    let mut config = ScanConfig::new(Target::parse("http://127.0.0.1:9").unwrap());
    config.har_dir = Some(std::env::temp_dir());
    let client = build_client(&config).unwrap();
    let engine = Arc::new(Engine::new(client, &config, Arc::new(CancelSignal::new())));
    let soft404 = Arc::new(DetectSoft404::new(engine.clone(), side_chain(&config), 5120));
    let chain = build_chain(&engine, &config, &Arc::new(Reporter::silent()), soft404);

    assert_eq!(
        chain.names(),
        vec![
            "dynamic_timeout",
            "redirect_limiter",
            "follow_redirects",
            "reject_catch_all_redirect",
            "filter_request_from_url",
            "ignore_large_body",
            "dead_host_detection",
            "reject_status_code",
            "detect_soft404",
            "reject_soft404",
            "match_string",
            "detect_behavior_change",
            "log_behavior_change",
            "reject_ignored_query",
            "set_header",
            "store_har",
        ]
    );
    assert_eq!(
        side_chain(&config).names(),
        vec!["filter_request_from_url", "ignore_large_body", "set_header"]
    );
}

#[tokio::test]
async fn test_cancel_signal() {
    let cancel = Arc::new(CancelSignal::new());
    assert!(!cancel.is_cancelled());

    let waiter = {
        let cancel = cancel.clone();
        tokio::spawn(async move { cancel.cancelled().await })
    };
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert!(cancel.is_cancelled());
}

// OUTPUT TESTS
#[test]
fn test_format_found() {
    assert_eq!(
        Reporter::format_found(&found_event()),
        "Tomcat redirect, admin panel at: http://t/admin/"
    );
}

#[test]
fn test_format_line_plain() {
    let reporter = Reporter::new(false, true, false);
    let line = reporter.format_line(Level::Found(Severity::High), "something");
    assert!(line.starts_with('['));
    assert!(line.ends_with("] [HIGH] something"));
    assert_eq!(line.len(), "[HH:MM:SS] [HIGH] something".len());

    let line = reporter.format_line(Level::Timeout, "slow");
    assert!(line.ends_with("[TIMEOUT] slow"));
}

#[test]
fn test_json_report() {
    let event = found_event();
    let report = Reporter::render_json(std::slice::from_ref(&event)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report).unwrap();

    assert_eq!(json["from"], "softbuster");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    let result = &json["result"][0];
    assert_eq!(result["description"], "admin panel");
    assert_eq!(result["url"], "http://t/admin/");
    assert_eq!(result["code"], 404);
    assert_eq!(result["severity"], "warning");
    assert_eq!(result["special"], "tomcat-redirect");
    assert!(result.get("prefix").is_none());

    // The pretty line carries the same description and url
    let pretty = Reporter::format_found(&event);
    assert!(pretty.contains(result["description"].as_str().unwrap()));
    assert!(pretty.contains(result["url"].as_str().unwrap()));
}

#[test]
fn test_json_report_omits_missing_special() {
    let mut event = found_event();
    event.special = None;
    let report = Reporter::render_json(&[event]).unwrap();
    let json: serde_json::Value = serde_json::from_str(&report).unwrap();
    assert!(json["result"][0].get("special").is_none());
}

#[test]
fn test_reporter_accumulates_and_counts() {
    let reporter = Reporter::silent();
    reporter.found(found_event());
    reporter.error("boom");
    reporter.timeout("slow");
    reporter.info("hello");

    assert_eq!(reporter.findings(), vec![found_event()]);
    assert_eq!(reporter.error_count(), 2);
}

#[test]
fn test_severity_display() {
    assert_eq!(Severity::Informational.to_string(), "informational");
    assert_eq!(Severity::Critical.level_name(), "CRITICAL");
}
