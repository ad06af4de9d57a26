use std::sync::{Arc, Mutex};

use resource_cache::caching::{CacheEntry, Callback, Resource, ResourceCache};
use resource_cache::config::Config;
use resource_cache::main_context::{self, MainLoop};
use tokio::runtime::Handle;

pub use resource_cache_test::{CdnServer, TempDir, setup, tempdir};

/// Creates a [`ResourceCache`] talking to `cdn`, with a disk tier in a fresh temp directory.
///
/// The `update_config` closure can modify any default configuration if needed before the
/// cache is created.
pub fn setup_cache<F>(cdn: &CdnServer, update_config: F) -> (ResourceCache, MainLoop, TempDir)
where
    F: FnOnce(&mut Config),
{
    setup();

    let cache_dir = tempdir();
    let mut config = Config {
        cache_dir: Some(cache_dir.path().to_owned()),
        cdn_url: cdn.url("/resources/"),
        ..Default::default()
    };
    update_config(&mut config);

    let (cache, main_loop) = cache_from_config(&config);
    (cache, main_loop, cache_dir)
}

pub fn cache_from_config(config: &Config) -> (ResourceCache, MainLoop) {
    let (main, main_loop) = main_context::channel();
    let cache = ResourceCache::from_config(config, Handle::current(), main).unwrap();
    (cache, main_loop)
}

/// Fetches `name` and drives the main loop until the callback has run.
///
/// Returns the placeholder handed out synchronously, and the authoritative result. If the
/// resource was already in memory, the callback is never invoked and the result is that
/// in-memory resource.
pub async fn fetch_and_wait(
    cache: &ResourceCache,
    main_loop: &mut MainLoop,
    name: &str,
) -> (Option<Resource>, CacheEntry<Resource>) {
    let slot = Arc::new(Mutex::new(None));
    let callback: Callback = {
        let slot = slot.clone();
        Box::new(move |result| *slot.lock().unwrap() = Some(result))
    };

    let placeholder = cache.fetch(name, Some(callback));
    if !cache.is_pending(name) {
        if let Some(resource) = cache.get_cached(name) {
            return (placeholder, Ok(resource));
        }
    }

    loop {
        if let Some(result) = slot.lock().unwrap().take() {
            return (placeholder, result);
        }
        assert!(main_loop.turn().await, "main loop closed");
    }
}
