use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use resource_cache::assets::EmbeddedAssets;
use resource_cache::caching::{CacheEntry, CacheError, DiskCache, Resource, ResourceCache};
use resource_cache::config::Config;
use resource_cache::download::HttpTransport;
use resource_cache::main_context;
use serde_json::json;
use tokio::runtime::Handle;

use crate::{CdnServer, cache_from_config, fetch_and_wait, setup, setup_cache};

fn bank_tables() -> CdnServer {
    CdnServer::new([
        (
            "resources/au_becs_bsb",
            json!({"062-000": "Commonwealth Bank"}),
        ),
        ("resources/nz_bank_branch", json!({"01-0001": "ANZ"})),
    ])
}

#[tokio::test]
async fn test_fetch_over_http() {
    let cdn = bank_tables();
    let (cache, mut main_loop, cache_dir) = setup_cache(&cdn, |_| ());

    let (placeholder, result) = fetch_and_wait(&cache, &mut main_loop, "au_becs_bsb").await;
    assert!(placeholder.is_none());
    assert_eq!(*result.unwrap(), json!({"062-000": "Commonwealth Bank"}));

    assert_eq!(
        cdn.all_hits(),
        [("resources/au_becs_bsb.json".to_owned(), 1)]
    );
    assert!(
        cache_dir
            .path()
            .join("resources/au_becs_bsb.json")
            .is_file()
    );

    // served from memory from now on
    let resource = cache.fetch("au_becs_bsb", None).unwrap();
    assert_eq!(*resource, json!({"062-000": "Commonwealth Bank"}));
    assert_eq!(cdn.accesses(), 0);
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_download() {
    let cdn = bank_tables();
    let (cache, mut main_loop, _cache_dir) = setup_cache(&cdn, |_| ());

    let results = Arc::new(Mutex::new(vec![]));
    for _ in 0..5 {
        let results = results.clone();
        let placeholder = cache.fetch(
            "nz_bank_branch",
            Some(Box::new(move |result: CacheEntry<Resource>| {
                results.lock().unwrap().push(result)
            })),
        );
        assert!(placeholder.is_none());
    }

    for _ in 0..5 {
        main_loop.turn().await;
    }

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 5);
    for result in results.iter() {
        assert_eq!(**result.as_ref().unwrap(), json!({"01-0001": "ANZ"}));
    }
    assert_eq!(cdn.accesses(), 1);
}

#[tokio::test]
async fn test_restart_reads_from_disk() {
    let cdn = bank_tables();
    let (cache, mut main_loop, cache_dir) = setup_cache(&cdn, |_| ());

    let (_, result) = fetch_and_wait(&cache, &mut main_loop, "au_becs_bsb").await;
    assert!(result.is_ok());
    assert_eq!(cdn.accesses(), 1);

    // a new cache on the same directory, as after an application restart
    let config = Config {
        cache_dir: Some(cache_dir.path().to_owned()),
        cdn_url: cdn.url("/resources/"),
        ..Default::default()
    };
    let (restarted, mut restarted_loop) = cache_from_config(&config);

    let (_, result) = fetch_and_wait(&restarted, &mut restarted_loop, "au_becs_bsb").await;
    assert_eq!(*result.unwrap(), json!({"062-000": "Commonwealth Bank"}));
    assert_eq!(cdn.accesses(), 0);
}

#[tokio::test]
async fn test_missing_resource() {
    let cdn = bank_tables();
    let (cache, mut main_loop, cache_dir) = setup_cache(&cdn, |_| ());

    let (_, result) = fetch_and_wait(&cache, &mut main_loop, "us_aba_routing").await;
    assert_eq!(result.unwrap_err(), CacheError::NotFound);
    assert!(
        !cache_dir
            .path()
            .join("resources/us_aba_routing.json")
            .exists()
    );

    // not found is not remembered, the next request asks again
    let (_, result) = fetch_and_wait(&cache, &mut main_loop, "us_aba_routing").await;
    assert_eq!(result.unwrap_err(), CacheError::NotFound);
    assert_eq!(cdn.accesses(), 2);
}

#[tokio::test]
async fn test_server_error() {
    let cdn = bank_tables();
    let (cache, mut main_loop, _cache_dir) = setup_cache(&cdn, |_| ());

    cdn.respond_with(502);
    let (_, result) = fetch_and_wait(&cache, &mut main_loop, "au_becs_bsb").await;
    assert_eq!(
        result.unwrap_err(),
        CacheError::DownloadError("502 Bad Gateway".into())
    );
}

#[tokio::test]
async fn test_malformed_response() {
    let cdn = bank_tables();
    cdn.insert_raw("resources/broken", "{\"unterminated\": ");
    let (cache, mut main_loop, cache_dir) = setup_cache(&cdn, |_| ());

    let (_, result) = fetch_and_wait(&cache, &mut main_loop, "broken").await;
    assert!(matches!(result, Err(CacheError::Malformed(_))));
    assert!(!cache_dir.path().join("resources/broken.json").exists());
    assert!(cache.get_cached("broken").is_none());
}

#[tokio::test]
async fn test_corrupted_disk_entry_is_replaced() {
    let cdn = bank_tables();
    let (cache, mut main_loop, cache_dir) = setup_cache(&cdn, |_| ());

    let stored = cache_dir.path().join("resources/au_becs_bsb.json");
    fs::write(&stored, [0xff, 0xfe, 0x00]).unwrap();

    let (_, result) = fetch_and_wait(&cache, &mut main_loop, "au_becs_bsb").await;
    assert!(matches!(result, Err(CacheError::Malformed(_))));
    assert!(!stored.exists());
    assert_eq!(cdn.accesses(), 0);

    let (_, result) = fetch_and_wait(&cache, &mut main_loop, "au_becs_bsb").await;
    assert!(result.is_ok());
    assert_eq!(cdn.accesses(), 1);
    assert_eq!(
        serde_json::from_slice::<serde_json::Value>(&fs::read(&stored).unwrap()).unwrap(),
        json!({"062-000": "Commonwealth Bank"})
    );
}

#[tokio::test]
async fn test_assets_are_placeholders() {
    setup();
    let cdn = bank_tables();

    let assets = EmbeddedAssets::new().with_file("au_becs_bsb.json", r#"{"062-000": "bundled"}"#);
    let transport = HttpTransport::from_config(&Config::default());
    let (main, mut main_loop) = main_context::channel();
    let cache = ResourceCache::new(
        DiskCache::disabled(),
        Arc::new(assets),
        Arc::new(transport),
        cdn.url("/resources/"),
        Handle::current(),
        main,
    );

    let (placeholder, result) = fetch_and_wait(&cache, &mut main_loop, "au_becs_bsb").await;
    assert_eq!(*placeholder.unwrap(), json!({"062-000": "bundled"}));
    assert_eq!(*result.unwrap(), json!({"062-000": "Commonwealth Bank"}));
}

#[tokio::test]
async fn test_unreachable_cdn() {
    let cdn = bank_tables();
    let (cache, mut main_loop, _cache_dir) = setup_cache(&cdn, |config| {
        // nothing listens on the discard port
        config.cdn_url = "http://127.0.0.1:9/".parse().unwrap();
        config.connect_timeout = Duration::from_millis(200);
        config.max_download_timeout = Duration::from_millis(500);
    });

    let (_, result) = fetch_and_wait(&cache, &mut main_loop, "au_becs_bsb").await;
    let err = result.unwrap_err();
    assert!(
        matches!(err, CacheError::DownloadError(_) | CacheError::Timeout(_)),
        "{err:?}"
    );
    assert_eq!(cdn.accesses(), 0);
}
