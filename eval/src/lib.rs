//! `glagol-eval` implements a live evaluation tree: a directory of
//! source files, each file being a unit of code in some dialect, where
//! every unit can read the values of all other units through views of
//! the directory structure.
//!
//! Values are computed lazily and memoised per unit. Filesystem change
//! events invalidate the memoised state of the affected units, so that
//! the next read sees the new contents.
//!
//! The crate does not implement any dialect itself (apart from plain
//! text). Backends are plugged in through the [`Backend`] trait; see the
//! `glagol-glue` crate for the standard ones.

mod backend;
mod cache;
mod directory;
pub mod errors;
mod host;
pub mod io;
mod leaf;
mod node;
pub mod value;
mod view;
pub mod watch;

#[cfg(test)]
mod tests;

// Re-export the public interface used by other crates.
pub use crate::backend::{Backend, Backends, Compiled, Context, TextBackend};
pub use crate::cache::{CacheCell, Slot, Stages};
pub use crate::directory::Directory;
pub use crate::errors::{CompileError, ErrorKind, EvalResult, Location};
pub use crate::host::{Host, HostBuilder, ScanFilter, DEFAULT_IGNORED};
pub use crate::leaf::Leaf;
pub use crate::node::Node;
pub use crate::value::{Attrs, Builtin, Function, Value};
pub use crate::view::{View, PARENT_KEY, SELF_KEY, UNIT_KEY};

#[cfg(feature = "impure")]
pub use crate::io::StdIO;
pub use crate::io::{DummyIO, FileType, TreeIO};
pub use crate::watch::{QueueWatchIO, Watch, WatchEvent, WatchEventKind, WatchIO};
