#![forbid(unsafe_code)]

//! Bulk ASN refresh pipeline tests against a local fixture server.

use axum::extract::State;
use axum::routing::get;
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use routelens::asn::lookup::{AsnError, AsnLookup, AsnLookupConfig};
use routelens::asn::{AsnMetaIndex, AsnMetaStats};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DATASET_CSV: &str = "\
ASN,Name,Class,CC
AS64500,First Networks,transit,ZZ
AS64501,Second Networks,eyeball,YY
64502,Third Networks,,XX
";

#[derive(Clone, Default)]
struct Fixture {
    meta: AsnMetaIndex,
    gz: Vec<u8>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(ring::digest::digest(&ring::digest::SHA256, bytes).as_ref())
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

fn make_fixture(csv: &str, timestamp: i64) -> Fixture {
    let gz = gzip(csv.as_bytes());
    let mut hash_list = HashMap::new();
    hash_list.insert("asns.csv".to_string(), sha256_hex(csv.as_bytes()));
    hash_list.insert("asns.csv.gz".to_string(), sha256_hex(&gz));
    Fixture {
        meta: AsnMetaIndex {
            timestamp,
            version: "1".to_string(),
            stats: AsnMetaStats { generated_at: "test".to_string() },
            hash_list,
        },
        gz,
    }
}

async fn serve_fixture(fixture: Arc<Mutex<Fixture>>) -> String {
    async fn meta(State(fx): State<Arc<Mutex<Fixture>>>) -> axum::Json<AsnMetaIndex> {
        axum::Json(fx.lock().unwrap().meta.clone())
    }
    async fn data(State(fx): State<Arc<Mutex<Fixture>>>) -> Vec<u8> {
        fx.lock().unwrap().gz.clone()
    }

    let app = Router::new()
        .route("/index-meta.json", get(meta))
        .route("/asns.csv.gz", get(data))
        .with_state(fixture);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve fixture");
    });
    format!("http://{addr}")
}

fn lookup_against(base: &str, dir: &std::path::Path) -> Arc<AsnLookup> {
    let cfg = AsnLookupConfig {
        data_dir: dir.to_string_lossy().to_string(),
        meta_url: format!("{base}/index-meta.json"),
        data_url: format!("{base}/asns.csv.gz"),
        max_memory_items: 16,
        update_interval: Duration::from_secs(3600),
        http_timeout: Duration::from_secs(5),
        max_concurrent: 4,
    };
    Arc::new(AsnLookup::new(cfg).expect("lookup"))
}

#[tokio::test]
async fn refresh_applies_skips_and_aborts_on_hash_mismatch() {
    let fixture = Arc::new(Mutex::new(make_fixture(DATASET_CSV, 100)));
    let base = serve_fixture(Arc::clone(&fixture)).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let lookup = lookup_against(&base, dir.path());

    // First refresh installs the three records.
    assert!(lookup.check_and_update().await.expect("refresh"));
    assert_eq!(lookup.query(64500).expect("64500").name, "First Networks");
    assert_eq!(lookup.query(64501).expect("64501").name, "Second Networks");
    assert_eq!(lookup.query(64502).expect("64502").cc, "XX");
    let stats = lookup.stats();
    assert_eq!(stats.update_count, 1);
    assert_eq!(stats.last_update, 100);

    // Same timestamp: skipped, no write.
    assert!(!lookup.check_and_update().await.expect("refresh"));
    assert_eq!(lookup.stats().update_count, 1);

    // Newer timestamp but corrupted csv hash: aborts before any record is
    // written, the previous three stay intact, the timestamp does not move.
    {
        let mut fx = fixture.lock().unwrap();
        let tampered = DATASET_CSV.replace("First", "Hacked");
        *fx = make_fixture(&tampered, 200);
        fx.meta
            .hash_list
            .insert("asns.csv".to_string(), "0badc0de".to_string());
    }
    let err = lookup.check_and_update().await.expect_err("must fail");
    assert!(matches!(err, AsnError::HashMismatch(ref f) if f == "asns.csv"), "{err}");
    assert_eq!(lookup.query(64500).expect("64500").name, "First Networks");
    assert_eq!(lookup.stats().last_update, 100);

    // Corrupted gz hash fails even earlier.
    {
        let mut fx = fixture.lock().unwrap();
        *fx = make_fixture(DATASET_CSV, 200);
        fx.meta
            .hash_list
            .insert("asns.csv.gz".to_string(), "0badc0de".to_string());
    }
    let err = lookup.check_and_update().await.expect_err("must fail");
    assert!(matches!(err, AsnError::HashMismatch(ref f) if f == "asns.csv.gz"), "{err}");

    // A clean newer dataset finally applies.
    {
        let mut fx = fixture.lock().unwrap();
        *fx = make_fixture(&DATASET_CSV.replace("First", "Renamed"), 300);
    }
    assert!(lookup.check_and_update().await.expect("refresh"));
    assert_eq!(lookup.stats().last_update, 300);
    // The disk tier carries the new name; the memory tier keeps serving
    // the previously cached record until it ages out of the LRU.
    assert_eq!(
        lookup.store().get(64500).expect("disk").expect("record").name,
        "Renamed Networks"
    );
    assert_eq!(lookup.query(64500).expect("64500").name, "First Networks");
}

#[tokio::test]
async fn applied_timestamp_survives_a_restart() {
    let fixture = Arc::new(Mutex::new(make_fixture(DATASET_CSV, 100)));
    let base = serve_fixture(Arc::clone(&fixture)).await;
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let lookup = lookup_against(&base, dir.path());
        assert!(lookup.check_and_update().await.expect("refresh"));
    }

    // A new instance over the same data dir sees the persisted meta and
    // skips the same-timestamp dataset.
    let lookup = lookup_against(&base, dir.path());
    assert!(!lookup.check_and_update().await.expect("refresh"));
    assert_eq!(lookup.query(64500).expect("64500").name, "First Networks");
}

#[tokio::test]
async fn ready_after_a_failed_first_attempt() {
    // Nothing listens on the meta URL; the eager refresh fails, yet the
    // cache still becomes ready and serves misses.
    let dir = tempfile::tempdir().expect("tempdir");
    let lookup = lookup_against("http://127.0.0.1:9", dir.path());

    let (_tx, rx) = tokio::sync::watch::channel(false);
    lookup.clone().start(rx);

    tokio::time::timeout(Duration::from_secs(10), lookup.wait_ready())
        .await
        .expect("cache must become ready after the first attempt");
    assert!(lookup.is_ready());
    assert!(matches!(lookup.query(64500), Err(AsnError::NotFound)));
}
