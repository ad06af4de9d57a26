//! A tiered cache for named JSON resources.
//!
//! The entry point is [`ResourceCache`](caching::ResourceCache), which resolves resources
//! through memory, disk and a remote CDN, falling back to bundled assets as placeholders, and
//! delivers results on a [`MainContext`](main_context::MainContext).

pub mod assets;
pub mod caching;
pub mod config;
pub mod download;
pub mod logging;
pub mod main_context;
pub mod utils;
