//! Concrete collaborators of the glagol evaluation tree: the standard
//! dialect backends and a filesystem watcher.
//!
//! [`standard_host`] returns a [`HostBuilder`] with all of them
//! registered, which is what the `glagol` command-line tool uses.

use std::rc::Rc;

use glagol_eval::{Backend, HostBuilder, TextBackend, TreeIO};

pub mod json;
pub mod nix;
mod notify_watch;

#[cfg(test)]
mod tests;

pub use json::JsonBackend;
pub use nix::{NixBackend, NixError};
pub use notify_watch::NotifyWatchIO;

/// Names of the dialects [`standard_host`] knows about.
pub const DIALECTS: &[&str] = &[nix::DIALECT, json::DIALECT, "text"];

/// Look up one of the standard backends by its dialect name.
pub fn backend_for_dialect(dialect: &str) -> Option<Rc<dyn Backend>> {
    match dialect {
        nix::DIALECT => Some(Rc::new(NixBackend)),
        json::DIALECT => Some(Rc::new(JsonBackend)),
        "text" => Some(Rc::new(TextBackend)),
        _ => None,
    }
}

/// Host builder with the standard backends registered by extension:
/// `.nix` files are nix, `.json` files are JSON and `.txt`/`.md` files
/// are plain text. Every other file uses the nix dialect.
///
/// Watching is not configured; use [`HostBuilder::watch_with`] with a
/// [`NotifyWatchIO`] for live trees.
pub fn standard_host(io: Rc<dyn TreeIO>) -> HostBuilder {
    let nix: Rc<dyn Backend> = Rc::new(NixBackend);
    let text: Rc<dyn Backend> = Rc::new(TextBackend);

    HostBuilder::new(io)
        .default_backend(nix.clone())
        .add_backend("nix", nix)
        .add_backend("json", Rc::new(JsonBackend))
        .add_backend("txt", text.clone())
        .add_backend("md", text)
}
