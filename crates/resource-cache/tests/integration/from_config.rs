use std::fs;
use std::time::Duration;

use resource_cache::config::Config;
use serde_json::json;

use crate::{CdnServer, cache_from_config, fetch_and_wait, setup, tempdir};

#[tokio::test]
async fn test_cache_from_config_file() {
    setup();

    let cdn = CdnServer::new([("v2/routing", json!({"version": 2}))]);
    let workdir = tempdir();

    let assets_dir = workdir.path().join("assets");
    fs::create_dir(&assets_dir).unwrap();
    fs::write(assets_dir.join("routing.json"), r#"{"version": 1}"#).unwrap();

    let config_path = workdir.path().join("config.yml");
    let yaml = format!(
        "cache_dir: {cache_dir}\n\
         assets_dir: {assets_dir}\n\
         cdn_url: {cdn_url}\n\
         max_download_timeout: 5s\n\
         logging:\n  level: debug\n",
        cache_dir = workdir.path().join("cache").display(),
        assets_dir = assets_dir.display(),
        cdn_url = cdn.url("/v2"),
    );
    fs::write(&config_path, yaml).unwrap();

    let config = Config::get(Some(&config_path)).unwrap();
    assert_eq!(config.max_download_timeout, Duration::from_secs(5));

    let (cache, mut main_loop) = cache_from_config(&config);
    let (placeholder, result) = fetch_and_wait(&cache, &mut main_loop, "routing").await;

    assert_eq!(*placeholder.unwrap(), json!({"version": 1}));
    assert_eq!(*result.unwrap(), json!({"version": 2}));
    // a base url without trailing slash still keeps its last segment
    assert_eq!(cdn.all_hits(), [("v2/routing.json".to_owned(), 1)]);
    assert!(workdir.path().join("cache/resources/routing.json").is_file());
}

#[test]
fn test_missing_config_file() {
    let workdir = tempdir();
    let err = Config::get(Some(&workdir.path().join("nope.yml"))).unwrap_err();
    assert_eq!(err.to_string(), "failed to open configuration file");
}
