//! # Resource Caching
//!
//! Resources are named JSON documents hosted on a CDN, like the routing tables of a bank
//! directory. They change rarely, are needed often, and should be usable even before the
//! first download finished. This module contains the tiers that make that possible.
//!
//! ## Cache Tiers
//!
//! A request for a resource goes through the following steps:
//! - First, it goes through the in-memory tier, which answers synchronously.
//! - On miss, a background resolution is started, unless one is already in flight for the same
//!   name, in which case the request just joins it (request coalescing).
//! - While that resolution is running, a bundled asset is handed out as a placeholder.
//! - The resolution tries to load the resource from the file system, if enabled.
//! - On miss, the resource is downloaded from the CDN and written to the file system.
//! - The result is put into the in-memory tier and delivered to every waiting request, on the
//!   main context.
//!
//! Successful results are never evicted from memory, and the file system tier has no expiry
//! either. Failures are not cached at all: the next request starts a fresh resolution.
//!
//! ## [`CacheEntry`] / [`CacheError`]
//!
//! Results are [`CacheEntry`]s, which are just an alias for a [`Result`] around a
//! [`CacheError`]. The error is [`Clone`], as one resolution fans out to all its waiters.
//!
//! [`CacheError::NotFound`] is the normal outcome for resources the CDN does not know about.
//! [`CacheError::Malformed`] signals a payload that is not valid JSON, be it from the CDN or a
//! corrupted file on disk. Corrupted files are removed, so that the next request downloads
//! the resource again.
//!
//! ## Configuration
//!
//! The file system tier is gated by the [`Config::cache_dir`](crate::config::Config::cache_dir)
//! option. If no `cache_dir` is configured, resources are downloaded directly after the
//! in-memory tier missed.

mod cache_error;
mod cache_key;
mod fs;
mod memory;

pub use cache_error::{CacheEntry, CacheError};
pub use cache_key::ResourceName;
pub use fs::DiskCache;
pub use memory::{Callback, Resource, ResourceCache};
