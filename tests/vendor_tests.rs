use axum::{extract::Path, extract::State, http::StatusCode, routing::get, Router};
use lan_sweep::vendor::{
    VendorConfig, VendorResolver, OUI_CACHE_FILE, OUI_REGISTRY_FILE, RESOLVED_CACHE_FILE,
    UNKNOWN_VENDOR,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const REGISTRY: &str = "\
OUI/MA-L                                                    Organization
company_id                                                  Organization

12-34-56   (hex)\t\tExample Networks, Inc.
123456     (base 16)\t\tExample Networks, Inc.
\t\t\t\t1 Example Road
";

fn write_json(path: PathBuf, entries: &[(&str, &str)]) {
    let map: HashMap<&str, &str> = entries.iter().copied().collect();
    std::fs::write(path, serde_json::to_vec(&map).unwrap()).unwrap();
}

async fn wait_for_file(path: &std::path::Path) -> String {
    for _ in 0..100 {
        if let Ok(text) = tokio::fs::read_to_string(path).await {
            if !text.is_empty() {
                return text;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} was never written", path.display());
}

#[tokio::test]
async fn static_table_hit_is_cached_and_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = VendorResolver::new(VendorConfig::offline(dir.path()));

    assert_eq!(resolver.resolve("00:50:56:aa:bb:cc").await, "VMware");
    assert_eq!(resolver.resolve("00-50-56-11-22-33").await, "VMware");
    assert_eq!(
        resolver.resolved_snapshot().await.get("00:50:56").map(String::as_str),
        Some("VMware")
    );

    let text = wait_for_file(&dir.path().join(RESOLVED_CACHE_FILE)).await;
    let saved: HashMap<String, String> = serde_json::from_str(&text).unwrap();
    assert_eq!(saved.get("00:50:56").map(String::as_str), Some("VMware"));
}

#[test]
fn caches_survive_runtime_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(OUI_REGISTRY_FILE), REGISTRY).unwrap();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let vendor = rt.block_on(async {
        let resolver = VendorResolver::new(VendorConfig::offline(dir.path()));
        let vendor = resolver.resolve("12:34:56:00:00:01").await;
        resolver.flush().await;
        vendor
    });
    drop(rt);

    assert_eq!(vendor, "Example Networks");
    let oui_cache = std::fs::read_to_string(dir.path().join(OUI_CACHE_FILE)).unwrap();
    assert!(oui_cache.contains("Example Networks"));
    let resolved = std::fs::read_to_string(dir.path().join(RESOLVED_CACHE_FILE)).unwrap();
    assert!(resolved.contains("12:34:56"));
}

#[tokio::test]
async fn persisted_cache_keeps_every_entry() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = Arc::new(VendorResolver::new(VendorConfig::offline(dir.path())));

    let macs = [
        "00:50:56:00:00:01",
        "08:00:27:00:00:01",
        "00:0c:29:00:00:01",
        "b8:27:eb:00:00:01",
    ];
    let mut tasks = Vec::new();
    for mac in macs {
        let resolver = resolver.clone();
        tasks.push(tokio::spawn(async move { resolver.resolve(mac).await }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    resolver.flush().await;

    let text = std::fs::read_to_string(dir.path().join(RESOLVED_CACHE_FILE)).unwrap();
    let saved: HashMap<String, String> = serde_json::from_str(&text).unwrap();
    let expected: HashMap<String, String> = resolver
        .resolved_snapshot()
        .await
        .into_iter()
        .filter(|(_, v)| v != UNKNOWN_VENDOR)
        .collect();
    assert_eq!(saved, expected);
}

#[tokio::test]
async fn short_mac_has_no_vendor() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = VendorResolver::new(VendorConfig::offline(dir.path()));
    assert_eq!(resolver.resolve("00:1a").await, "");
    assert_eq!(resolver.resolve("").await, "");
}

#[tokio::test]
async fn persisted_resolved_cache_wins() {
    let dir = tempfile::tempdir().unwrap();
    // Overrides the built-in table entry for the same prefix.
    write_json(
        dir.path().join(RESOLVED_CACHE_FILE),
        &[("00:50:56", "Cached VMware"), ("AA:BB:CC", "Acme")],
    );
    let resolver = VendorResolver::new(VendorConfig::offline(dir.path()));

    assert_eq!(resolver.resolve("aa:bb:cc:00:11:22").await, "Acme");
    assert_eq!(resolver.resolve("00:50:56:00:00:01").await, "Cached VMware");
}

#[tokio::test]
async fn oui_database_cache_is_used() {
    let dir = tempfile::tempdir().unwrap();
    write_json(dir.path().join(OUI_CACHE_FILE), &[("12:34:56", "Cachedco")]);
    let resolver = VendorResolver::new(VendorConfig::offline(dir.path()));

    assert_eq!(resolver.resolve("12:34:56:78:9a:bc").await, "Cachedco");
    assert_eq!(resolver.oui_db_len().await, 1);
}

#[tokio::test]
async fn fresh_local_registry_is_parsed_and_cached() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(OUI_REGISTRY_FILE), REGISTRY).unwrap();
    let resolver = VendorResolver::new(VendorConfig::offline(dir.path()));

    assert_eq!(resolver.resolve("12:34:56:00:00:01").await, "Example Networks");

    let text = wait_for_file(&dir.path().join(OUI_CACHE_FILE)).await;
    let saved: HashMap<String, String> = serde_json::from_str(&text).unwrap();
    assert_eq!(saved.get("12:34:56").map(String::as_str), Some("Example Networks"));
}

#[tokio::test]
async fn unknown_offline_is_unknown_and_not_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = VendorResolver::new(VendorConfig::offline(dir.path()));

    assert_eq!(resolver.resolve("02:ab:cd:00:00:01").await, UNKNOWN_VENDOR);
    assert_eq!(
        resolver.resolved_snapshot().await.get("02:AB:CD").map(String::as_str),
        Some(UNKNOWN_VENDOR)
    );

    // A later known lookup persists, and the negative entry stays out of the file.
    resolver.resolve("00:50:56:00:00:01").await;
    let text = wait_for_file(&dir.path().join(RESOLVED_CACHE_FILE)).await;
    assert!(!text.contains("02:AB:CD"));
}

#[derive(Clone, Default)]
struct Hits {
    registry: Arc<AtomicUsize>,
    lookups: Arc<AtomicUsize>,
}

async fn serve_registry(State(hits): State<Hits>) -> &'static str {
    hits.registry.fetch_add(1, Ordering::SeqCst);
    REGISTRY
}

async fn serve_lookup(
    State(hits): State<Hits>,
    Path(oui): Path<String>,
) -> Result<String, StatusCode> {
    hits.lookups.fetch_add(1, Ordering::SeqCst);
    match oui.as_str() {
        "02ABCD" => Ok("Api Vendor\n".to_string()),
        "02EEEE" => Ok("{\"errors\":{\"detail\":\"Not Found\"}}".to_string()),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn fake_sources() -> (String, Hits) {
    let hits = Hits::default();
    let app = Router::new()
        .route("/oui.txt", get(serve_registry))
        .route("/api/{oui}", get(serve_lookup))
        .with_state(hits.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (base, hits)
}

fn online_config(dir: &std::path::Path, base: &str) -> VendorConfig {
    VendorConfig {
        cache_dir: dir.to_path_buf(),
        registry_url: Some(format!("{base}/oui.txt")),
        registry_timeout: Duration::from_secs(5),
        lookup_api: Some(format!("{base}/api")),
        lookup_timeout: Duration::from_secs(2),
        ..VendorConfig::default()
    }
}

#[tokio::test]
async fn registry_is_downloaded_once() {
    let dir = tempfile::tempdir().unwrap();
    let (base, hits) = fake_sources().await;
    let resolver = Arc::new(VendorResolver::new(online_config(dir.path(), &base)));

    let mut tasks = Vec::new();
    for i in 0..8 {
        let resolver = resolver.clone();
        tasks.push(tokio::spawn(async move {
            resolver.resolve(&format!("12:34:56:00:00:{i:02x}")).await
        }));
    }
    for t in tasks {
        assert_eq!(t.await.unwrap(), "Example Networks");
    }
    assert_eq!(hits.registry.load(Ordering::SeqCst), 1);

    let raw = std::fs::read_to_string(dir.path().join(OUI_REGISTRY_FILE)).unwrap();
    assert_eq!(raw, REGISTRY);
}

#[tokio::test]
async fn online_lookup_fills_gaps_once() {
    let dir = tempfile::tempdir().unwrap();
    let (base, hits) = fake_sources().await;
    let resolver = VendorResolver::new(online_config(dir.path(), &base));

    assert_eq!(resolver.resolve("02:ab:cd:00:00:01").await, "Api Vendor");
    assert_eq!(resolver.resolve("02:ab:cd:00:00:02").await, "Api Vendor");
    assert_eq!(hits.lookups.load(Ordering::SeqCst), 1);

    // Error bodies and misses both end up as Unknown, asked only once each.
    assert_eq!(resolver.resolve("02:ee:ee:00:00:01").await, UNKNOWN_VENDOR);
    assert_eq!(resolver.resolve("02:99:99:00:00:01").await, UNKNOWN_VENDOR);
    assert_eq!(resolver.resolve("02:99:99:00:00:02").await, UNKNOWN_VENDOR);
    assert_eq!(hits.lookups.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn static_table_hit_needs_no_lookup_call() {
    let dir = tempfile::tempdir().unwrap();
    let (base, hits) = fake_sources().await;
    let resolver = VendorResolver::new(online_config(dir.path(), &base));

    assert_eq!(resolver.resolve("00:50:56:aa:bb:cc").await, "VMware");
    assert_eq!(resolver.resolve("00:50:56:dd:ee:ff").await, "VMware");
    assert_eq!(hits.lookups.load(Ordering::SeqCst), 0);
    assert!(hits.registry.load(Ordering::SeqCst) <= 1);
}
