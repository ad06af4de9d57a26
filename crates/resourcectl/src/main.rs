//! Resourcectl.
//!
//! A command line front end to the resource cache. It fetches named JSON resources through the
//! same memory, disk and CDN tiers an application would use, and can wipe the disk cache.

#![warn(
    missing_docs,
    missing_debug_implementations,
    unused_crate_dependencies,
    clippy::all
)]

mod cli;
mod logging;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
