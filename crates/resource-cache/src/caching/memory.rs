use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::watch;
use url::Url;

use crate::assets::{AssetSource, DirectoryAssets, NoAssets, load_asset};
use crate::config::Config;
use crate::download::{HttpTransport, ResourceRequest, ResourceTransport};
use crate::main_context::MainContext;
use crate::utils::defer::{DeferGuard, defer};

use super::{CacheEntry, CacheError, DiskCache, ResourceName};

/// A parsed JSON resource, shared between the cache and all its consumers.
pub type Resource = Arc<serde_json::Value>;

/// Receives the authoritative result of a resolution, exactly once.
pub type Callback = Box<dyn FnOnce(CacheEntry<Resource>) + Send + 'static>;

#[derive(Default)]
struct State {
    /// Successfully resolved resources. Entries are never evicted.
    memory: HashMap<ResourceName, Resource>,
    /// The callbacks waiting on a resolution that is currently in flight.
    ///
    /// An entry exists exactly as long as a resolution for that name is running.
    waiters: HashMap<ResourceName, Vec<Callback>>,
}

struct Inner {
    state: Mutex<State>,
    disk: DiskCache,
    assets: Arc<dyn AssetSource>,
    transport: Arc<dyn ResourceTransport>,
    cdn_url: Url,
    /// The worker runtime resolutions are spawned on.
    runtime: Handle,
    /// The context callbacks are delivered on.
    main: MainContext,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A cache of named JSON resources.
///
/// Resources are resolved through the following tiers, in order:
///
/// 1. The in-memory cache, answered synchronously.
/// 2. The [`DiskCache`].
/// 3. The remote CDN, through a [`ResourceTransport`].
///
/// While tiers 2 and 3 are consulted in the background, a bundled asset, if there is one, is
/// handed out as a placeholder. Concurrent requests for the same resource are coalesced, so
/// that only one resolution per name is ever in flight.
///
/// Cloning the cache is cheap, clones share all their state.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (in_memory, in_flight) = self
            .inner
            .state
            .try_lock()
            .map(|state| (state.memory.len(), state.waiters.len()))
            .unwrap_or_default();
        f.debug_struct("ResourceCache")
            .field("disk", &self.inner.disk)
            .field("assets", &self.inner.assets)
            .field("transport", &self.inner.transport)
            .field("cdn_url", &self.inner.cdn_url.as_str())
            .field("in-memory items", &in_memory)
            .field("in-flight resolutions", &in_flight)
            .finish()
    }
}

impl ResourceCache {
    pub fn new(
        disk: DiskCache,
        assets: Arc<dyn AssetSource>,
        transport: Arc<dyn ResourceTransport>,
        cdn_url: Url,
        runtime: Handle,
        main: MainContext,
    ) -> Self {
        let inner = Inner {
            state: Default::default(),
            disk,
            assets,
            transport,
            cdn_url,
            runtime,
            main,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Creates a cache talking HTTP to the configured CDN.
    pub fn from_config(config: &Config, runtime: Handle, main: MainContext) -> io::Result<Self> {
        let disk = DiskCache::from_config(config)?;
        let assets: Arc<dyn AssetSource> = match &config.assets_dir {
            Some(dir) => Arc::new(DirectoryAssets::new(dir)),
            None => Arc::new(NoAssets),
        };
        let transport = Arc::new(HttpTransport::from_config(config));

        Ok(Self::new(
            disk,
            assets,
            transport,
            config.cdn_url.clone(),
            runtime,
            main,
        ))
    }

    /// Fetches the resource `name`.
    ///
    /// If the resource is already in memory it is returned right away, and `callback` is
    /// dropped without being called.
    ///
    /// Otherwise the resource is resolved in the background, and `callback` is invoked on the
    /// main context with the result once that is done. In the meantime the bundled asset for
    /// `name` is returned as a placeholder, if there is one.
    pub fn fetch(&self, name: &str, callback: Option<Callback>) -> Option<Resource> {
        let name = match ResourceName::new(name) {
            Ok(name) => name,
            Err(err) => {
                if let Some(callback) = callback {
                    self.inner.main.post(move || callback(Err(err)));
                }
                return None;
            }
        };

        let is_new = {
            let mut state = self.inner.state();
            if let Some(resource) = state.memory.get(&name) {
                tracing::trace!(resource = %name, "Found resource in memory");
                return Some(resource.clone());
            }

            match state.waiters.entry(name.clone()) {
                Entry::Occupied(mut waiters) => {
                    tracing::trace!(resource = %name, "Joining in-flight resolution");
                    waiters.get_mut().extend(callback);
                    false
                }
                Entry::Vacant(waiters) => {
                    waiters.insert(callback.into_iter().collect());
                    true
                }
            }
        };

        if is_new {
            tracing::trace!(resource = %name, "Spawning resolution");
            // A runtime that is shutting down drops the task without ever polling it.
            let abandoned = self.release_on_drop(name.clone());
            let this = self.clone();
            let name = name.clone();
            self.inner
                .runtime
                .spawn(async move { this.resolve(name, abandoned).await });
        }

        load_asset(self.inner.assets.as_ref(), &name)
    }

    /// Fetches the resource `name` into an observable `sink`.
    ///
    /// The placeholder, or the in-memory resource, is sent right away. The resolved resource
    /// is sent on the main context once available.
    ///
    /// Only actual resources are ever sent. When there is neither an in-memory resource nor a
    /// bundled placeholder, the sink is not touched until the resolution succeeds, so it keeps
    /// any value it held before. Failures leave the sink untouched as well.
    pub fn fetch_into(&self, name: &str, sink: watch::Sender<Option<Resource>>) {
        let callback_sink = sink.clone();
        let callback: Callback = Box::new(move |result| {
            if let Ok(resource) = result {
                callback_sink.send_replace(Some(resource));
            }
        });

        if let Some(resource) = self.fetch(name, Some(callback)) {
            sink.send_replace(Some(resource));
        }
    }

    /// Returns the resource `name` if it is in memory, without triggering a resolution.
    pub fn get_cached(&self, name: &str) -> Option<Resource> {
        let name = ResourceName::new(name).ok()?;
        self.inner.state().memory.get(&name).cloned()
    }

    /// Whether a resolution for `name` is currently in flight.
    pub fn is_pending(&self, name: &str) -> bool {
        ResourceName::new(name)
            .map(|name| self.inner.state().waiters.contains_key(&name))
            .unwrap_or(false)
    }

    /// Returns a guard that fails all waiters of `name` with an internal error when dropped.
    ///
    /// Should a resolution panic or never run at all, nobody would ever remove the waiters
    /// again, leaving `name` stuck in the pending state.
    fn release_on_drop(&self, name: ResourceName) -> DeferGuard<impl FnOnce() + Send + 'static> {
        let inner = Arc::clone(&self.inner);
        defer(move || {
            let waiters = inner.state().waiters.remove(&name).unwrap_or_default();
            for callback in waiters {
                inner
                    .main
                    .post(move || callback(Err(CacheError::InternalError)));
            }
        })
    }

    /// Resolves `name` and notifies all its waiters.
    async fn resolve(
        self,
        name: ResourceName,
        abandoned: DeferGuard<impl FnOnce() + Send + 'static>,
    ) {
        let result = self.lookup_or_fetch(&name).await;
        abandoned.cancel();

        if let Err(err) = &result {
            tracing::debug!(
                error = err as &dyn std::error::Error,
                resource = %name,
                "Failed to resolve resource"
            );
        }

        self.complete(&name, result);
    }

    /// Stores a successful result in memory and hands `result` to every waiter.
    fn complete(&self, name: &ResourceName, result: CacheEntry<Resource>) {
        let waiters = {
            let mut state = self.inner.state();
            if let Ok(resource) = &result {
                state.memory.insert(name.clone(), resource.clone());
            }
            state.waiters.remove(name).unwrap_or_default()
        };

        for callback in waiters {
            let result = result.clone();
            self.inner.main.post(move || callback(result));
        }
    }

    /// Looks the resource up on disk, or fetches it from the CDN.
    ///
    /// Freshly fetched resources are written to disk before returning.
    async fn lookup_or_fetch(&self, name: &ResourceName) -> CacheEntry<Resource> {
        let disk = &self.inner.disk;
        match disk.read(name).await {
            Ok(Some(contents)) => {
                return match serde_json::from_slice(&contents) {
                    Ok(value) => Ok(Arc::new(value)),
                    Err(e) => {
                        tracing::error!(
                            error = &e as &dyn std::error::Error,
                            resource = %name,
                            "Cached resource is not valid JSON, removing it",
                        );
                        disk.remove(name).await;
                        Err(e.into())
                    }
                };
            }
            Ok(None) => {}
            Err(e) => {
                // an unreadable entry is no different from a missing one
                tracing::error!(
                    error = &e as &dyn std::error::Error,
                    resource = %name,
                    "Failed to read resource from disk",
                );
            }
        }

        tracing::debug!(resource = %name, "Fetching resource from CDN");
        let request = ResourceRequest::new(&self.inner.cdn_url, name.clone())?;
        let response = self.inner.transport.execute(&request).await?;

        let body = response.body.clone();
        let resource = response.into_resource()?;
        disk.write(name, &body).await;

        Ok(resource)
    }
}
