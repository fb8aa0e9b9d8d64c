use bytes::Bytes;
use pinvault::{
    AssetStore, AssetStoreConfig, ContentId, Error, FnCredential, LifecycleStatus,
    LocalStoreConfig, MemoryConnector, MemoryPinningService, NetworkConfig, NodeConfig,
    NodeConfigStore, PinOutcome, PinningService, RegistrationPolicy, StaticCredential,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Harness {
    store: AssetStore,
    backends: Vec<(String, Arc<MemoryPinningService>)>,
    connector: MemoryConnector,
}

impl Harness {
    fn backend(&self, name: &str) -> &MemoryPinningService {
        &self
            .backends
            .iter()
            .find(|(n, _)| n == name)
            .expect("backend exists")
            .1
    }
}

/// Stores in these tests keep their content to themselves unless a test
/// turns networking on.
fn offline() -> AssetStoreConfig {
    AssetStoreConfig {
        node: NodeConfig {
            network: NetworkConfig::disabled(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn harness(names: &[&str]) -> Harness {
    harness_with(offline(), names)
}

fn harness_with(config: AssetStoreConfig, names: &[&str]) -> Harness {
    let mut connector = MemoryConnector::new();
    let mut backends = Vec::new();
    for name in names {
        let svc = Arc::new(MemoryPinningService::new());
        connector = connector.with_service(endpoint(name), svc.clone());
        backends.push((name.to_string(), svc));
    }

    let mut builder = AssetStore::builder(config).connector(Arc::new(connector.clone()));
    for name in names {
        builder = builder.service(PinningService::new(
            *name,
            endpoint(name),
            StaticCredential::new(format!("{name}-key")),
        ));
    }

    Harness {
        store: builder.build(),
        backends,
        connector,
    }
}

fn endpoint(name: &str) -> String {
    format!("mem://{name}")
}

#[tokio::test]
async fn test_same_bytes_same_cid() {
    let h = harness(&[]);
    let a = h
        .store
        .add_asset("a.txt", Some(Bytes::from_static(b"hello")))
        .await
        .unwrap();
    let b = h
        .store
        .add_asset("b.txt", Some(Bytes::from_static(b"hello")))
        .await
        .unwrap();
    let c = h
        .store
        .add_asset("c.txt", Some(Bytes::from_static(b"hello!")))
        .await
        .unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a, ContentId::for_bytes(b"hello"));
}

#[tokio::test]
async fn test_round_trip_and_uri_tolerance() {
    let h = harness(&[]);
    let payload = Bytes::from(patterned_bytes(300_000));
    let cid = h.store.add_asset("big.bin", Some(payload.clone())).await.unwrap();

    let uri = h.store.uri_for(cid).to_string();
    assert!(uri.starts_with("ipfs://"));
    assert_eq!(h.store.get(&uri).await.unwrap(), payload);
    assert_eq!(h.store.get(&cid.to_string()).await.unwrap(), payload);
    assert_eq!(h.store.get(&format!("IPFS://{cid}")).await.unwrap(), payload);
}

#[tokio::test]
async fn test_string_views() {
    let h = harness(&[]);
    let text = h
        .store
        .add_asset("hello.txt", Some(Bytes::from_static(b"hello world")))
        .await
        .unwrap();
    assert_eq!(h.store.get_string(&text.to_string()).await.unwrap(), "hello world");
    assert_eq!(
        h.store.get_base64_string(&text.to_string()).await.unwrap(),
        "aGVsbG8gd29ybGQ="
    );

    let binary = h
        .store
        .add_asset("bad.bin", Some(Bytes::from_static(&[0xff, 0xfe, 0x00])))
        .await
        .unwrap();
    assert!(matches!(
        h.store.get_string(&binary.to_string()).await,
        Err(Error::InvalidUtf8(_))
    ));
    assert_eq!(
        h.store.get_base64_string(&binary.to_string()).await.unwrap(),
        "//4A"
    );
}

#[tokio::test]
async fn test_unknown_content_is_not_found() {
    let h = harness(&[]);
    let cid = ContentId::for_bytes(b"nobody added this");
    assert!(matches!(
        h.store.get(&cid.to_string()).await,
        Err(Error::NotFound(c)) if c == cid
    ));
}

#[tokio::test]
async fn test_add_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cat.png");
    tokio::fs::write(&path, b"not really a png").await.unwrap();

    let h = harness(&["a"]);
    let cid = h
        .store
        .add_asset(path.to_str().unwrap(), None)
        .await
        .unwrap();
    assert_eq!(cid, ContentId::for_bytes(b"not really a png"));
    assert_eq!(h.store.add_asset_file(&path).await.unwrap(), cid);
    assert!(h.backend("a").is_pinned(cid));
}

#[tokio::test]
async fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.png");

    let h = harness(&[]);
    let err = h
        .store
        .add_asset(path.to_str().unwrap(), None)
        .await
        .unwrap_err();
    match err {
        Error::Io { path: p, source } => {
            assert_eq!(p, path);
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected io error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_cat_png_scenario() {
    let h = harness(&["A", "B"]);
    let x = h
        .store
        .add_asset("cat.png", Some(Bytes::from_static(b"\x89PNG meow")))
        .await
        .unwrap();

    assert!(h.store.is_pinned(x, "A").await.unwrap());
    assert!(h.store.is_pinned(x, "B").await.unwrap());
    assert_eq!(h.backend("A").add_calls(), 1);
    assert_eq!(h.backend("B").add_calls(), 1);

    let report = h.store.pin(x).await.unwrap();
    assert_eq!(report.outcome("A"), Some(PinOutcome::AlreadyPinned));
    assert_eq!(report.outcome("B"), Some(PinOutcome::AlreadyPinned));
    assert_eq!(h.backend("A").add_calls(), 1);
    assert_eq!(h.backend("B").add_calls(), 1);
}

#[tokio::test]
async fn test_pin_reaches_every_backend() {
    let names = ["one", "two", "three", "four", "five"];
    let h = harness(&names);
    let cid = ContentId::for_bytes(b"fan out");

    let report = h.store.pin(cid).await.unwrap();
    assert_eq!(report.len(), names.len());
    for name in names {
        assert_eq!(h.backend(name).list_calls(), 1, "{name} was not queried");
        assert!(h.backend(name).is_pinned(cid));
    }
}

#[tokio::test]
async fn test_seeded_pin_is_not_repeated() {
    let h = harness(&["a"]);
    let cid = ContentId::for_bytes(b"already there");
    h.backend("a").seed_pinned(cid);

    let report = h.store.pin(cid).await.unwrap();
    assert_eq!(report.outcome("a"), Some(PinOutcome::AlreadyPinned));
    assert_eq!(h.backend("a").add_calls(), 0);
}

#[tokio::test]
async fn test_no_backends_is_safe() {
    let h = harness(&[]);
    let report = h.store.pin(ContentId::for_bytes(b"lonely")).await.unwrap();
    assert!(report.is_empty());
    assert!(h.store.services().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_backend_is_reported() {
    let h = harness(&["good", "bad"]);
    h.store.initialize().await.unwrap();
    h.backend("bad").set_failure(Some("HTTP 401: invalid token"));

    let err = h
        .store
        .add_asset("doc.txt", Some(Bytes::from_static(b"important")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Aggregate(_)));
    assert_eq!(err.failed_services(), vec!["bad"]);
    assert!(err.to_string().contains("invalid token"));

    let cid = ContentId::for_bytes(b"important");
    assert!(h.backend("good").is_pinned(cid));
    assert_eq!(h.store.get_string(&cid.to_string()).await.unwrap(), "important");
}

#[tokio::test(start_paused = true)]
async fn test_hanging_backend_does_not_block_others() {
    let config = AssetStoreConfig {
        pin_timeout_secs: 5,
        ..offline()
    };
    let h = harness_with(config, &["fast", "stuck"]);
    h.store.initialize().await.unwrap();
    h.backend("stuck").set_delay(Some(Duration::from_secs(24 * 3600)));

    let cid = ContentId::for_bytes(b"time sensitive");
    let err = h.store.pin(cid).await.unwrap_err();
    assert_eq!(err.failed_services(), vec!["stuck"]);
    assert!(h.backend("fast").is_pinned(cid));
}

#[tokio::test]
async fn test_concurrent_pins_share_one_request() {
    let h = harness(&["a", "b"]);
    h.store.initialize().await.unwrap();
    h.backend("a").set_delay(Some(Duration::from_millis(30)));
    h.backend("b").set_delay(Some(Duration::from_millis(30)));
    let cid = ContentId::for_bytes(b"hot asset");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let store = h.store.clone();
        tasks.push(tokio::spawn(async move { store.pin(cid).await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(h.backend("a").add_calls(), 1);
    assert_eq!(h.backend("b").add_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_first_calls_initialize_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let svc = Arc::new(MemoryPinningService::new());
    let connector = MemoryConnector::new().with_service("mem://a", svc);
    let store = AssetStore::builder(offline())
        .connector(Arc::new(connector))
        .service(PinningService::new(
            "a",
            "mem://a",
            FnCredential::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("token".to_string())
            }),
        ))
        .build();

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store.add_asset("n", Some(Bytes::from(vec![i]))).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.services().await.unwrap(), vec!["a".to_string()]);
}

#[tokio::test]
async fn test_credential_is_resolved_at_registration() {
    let svc = Arc::new(MemoryPinningService::new());
    let connector = MemoryConnector::new().with_service("mem://rotating", svc);
    let generation = Arc::new(AtomicUsize::new(7));
    let source = generation.clone();
    let store = AssetStore::builder(offline())
        .connector(Arc::new(connector.clone()))
        .service(PinningService::new(
            "rotating",
            "mem://rotating",
            FnCredential::new(move || Ok(format!("token-{}", source.load(Ordering::SeqCst)))),
        ))
        .build();

    generation.store(8, Ordering::SeqCst);
    store.initialize().await.unwrap();
    assert_eq!(connector.key_for("mem://rotating").as_deref(), Some("token-8"));
}

#[tokio::test]
async fn test_registration_failure_aborts_by_default() {
    let h = harness(&["a"]);
    let store = AssetStore::builder(offline())
        .connector(Arc::new(h.connector.clone()))
        .service(PinningService::new("a", endpoint("a"), StaticCredential::new("k")))
        .service(PinningService::new(
            "broken",
            endpoint("broken"),
            StaticCredential::new("k"),
        ))
        .build();

    let err = store.initialize().await.unwrap_err();
    assert!(matches!(&err, Error::Initialization(reason) if reason.contains("broken")));
    assert_eq!(store.status(), LifecycleStatus::Failed);

    // Poisoned: later calls fail fast with the same reason.
    let again = store
        .add_asset("x", Some(Bytes::from_static(b"x")))
        .await
        .unwrap_err();
    assert!(matches!(again, Error::Initialization(reason) if reason.contains("broken")));
    assert_eq!(h.backend("a").add_calls(), 0);
}

#[tokio::test]
async fn test_registration_failure_can_be_skipped() {
    let h = harness(&["a"]);
    let config = AssetStoreConfig {
        registration_policy: RegistrationPolicy::SkipFailed,
        ..offline()
    };
    let store = AssetStore::builder(config)
        .connector(Arc::new(h.connector.clone()))
        .service(PinningService::new(
            "no-token",
            endpoint("a"),
            FnCredential::new(|| Err(anyhow::anyhow!("token expired"))),
        ))
        .service(PinningService::new("a", endpoint("a"), StaticCredential::new("k")))
        .build();

    let cid = store
        .add_asset("kept.txt", Some(Bytes::from_static(b"kept")))
        .await
        .unwrap();
    assert_eq!(store.services().await.unwrap(), vec!["a".to_string()]);
    assert!(h.backend("a").is_pinned(cid));
    assert_eq!(store.status(), LifecycleStatus::Ready);
}

#[tokio::test]
async fn test_duplicate_service_name_is_rejected() {
    let h = harness(&["a"]);
    let store = AssetStore::builder(offline())
        .connector(Arc::new(h.connector.clone()))
        .service(PinningService::new("a", endpoint("a"), StaticCredential::new("k")))
        .service(PinningService::new("a", endpoint("a"), StaticCredential::new("k")))
        .build();

    let err = store.initialize().await.unwrap_err();
    assert!(matches!(err, Error::Initialization(reason) if reason.contains("already registered")));
}

#[tokio::test]
async fn test_local_store_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let config = AssetStoreConfig {
        node: NodeConfig {
            store: NodeConfigStore::Local(LocalStoreConfig {
                base_path: dir.path().join("node").to_string_lossy().into_owned(),
            }),
            network: NetworkConfig::disabled(),
            ..Default::default()
        },
        ..Default::default()
    };

    let cid = {
        let store = AssetStore::new(config.clone());
        store
            .add_asset("note.md", Some(Bytes::from_static(b"# persisted")))
            .await
            .unwrap()
    };

    let reopened = AssetStore::new(config);
    assert_eq!(
        reopened.get_string(&format!("ipfs://{cid}")).await.unwrap(),
        "# persisted"
    );
}

#[tokio::test]
async fn test_pin_requests_point_at_the_node() {
    let config = AssetStoreConfig {
        node: NodeConfig {
            network: NetworkConfig::local(),
            origins: vec!["/dns4/mirror.example/tcp/443/https".into()],
            ..Default::default()
        },
        ..Default::default()
    };
    let h = harness_with(config, &["a"]);

    let cid = h
        .store
        .add_asset("cat.png", Some(Bytes::from_static(b"meow")))
        .await
        .unwrap();
    let origins = h.backend("a").origins_for(cid);
    assert_eq!(origins.len(), 2, "{origins:?}");
    assert!(origins[0].starts_with("/iroh/"), "{origins:?}");
    assert_eq!(origins[1], "/dns4/mirror.example/tcp/443/https");
}

fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
