//! Configuration shared by all nodes of a tree.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use smol_str::SmolStr;

use crate::backend::{Backend, Backends};
use crate::directory::Directory;
use crate::errors::EvalResult;
use crate::io::TreeIO;
use crate::leaf::Leaf;
use crate::watch::WatchIO;

/// Entry names skipped while scanning, at any depth.
pub const DEFAULT_IGNORED: &[&str] = &["node_modules", "target"];

/// Decides which directory entries become nodes of the tree.
#[derive(Clone, Debug)]
pub struct ScanFilter {
    ignored: Vec<SmolStr>,
    include_hidden: bool,
}

impl Default for ScanFilter {
    fn default() -> Self {
        ScanFilter {
            ignored: DEFAULT_IGNORED.iter().map(|s| SmolStr::from(*s)).collect(),
            include_hidden: false,
        }
    }
}

impl ScanFilter {
    pub fn admits(&self, name: &str) -> bool {
        if name.is_empty() || name == "." || name == ".." {
            return false;
        }

        if !self.include_hidden && name.starts_with('.') {
            return false;
        }

        !self.ignored.iter().any(|ignored| ignored == name)
    }
}

/// Filesystem access, change notifications, backends and scan rules
/// of one evaluation tree. Construct it with a [`HostBuilder`].
pub struct Host {
    io: Rc<dyn TreeIO>,
    watch: Option<Rc<dyn WatchIO>>,
    backends: Backends,
    filter: ScanFilter,
}

impl Host {
    pub fn io(&self) -> &Rc<dyn TreeIO> {
        &self.io
    }

    pub fn watch_io(&self) -> Option<&Rc<dyn WatchIO>> {
        self.watch.as_ref()
    }

    pub fn backends(&self) -> &Backends {
        &self.backends
    }

    pub fn filter(&self) -> &ScanFilter {
        &self.filter
    }

    /// Open the tree rooted at `path`. A missing directory yields an
    /// empty, unwatched tree.
    pub fn open<P: AsRef<Path>>(self: &Rc<Self>, path: P) -> EvalResult<Rc<Directory>> {
        Directory::new(self, path.as_ref())
    }

    /// Create a standalone leaf, not attached to any tree.
    pub fn leaf(&self, path: Option<PathBuf>, source: Option<String>) -> Rc<Leaf> {
        Leaf::new(self, path, source)
    }
}

pub struct HostBuilder {
    io: Rc<dyn TreeIO>,
    watch: Option<Rc<dyn WatchIO>>,
    backends: Backends,
    filter: ScanFilter,
}

impl HostBuilder {
    pub fn new(io: Rc<dyn TreeIO>) -> Self {
        HostBuilder {
            io,
            watch: None,
            backends: Backends::default(),
            filter: ScanFilter::default(),
        }
    }

    /// Watch every scanned directory through `watch`.
    pub fn watch_with(mut self, watch: Rc<dyn WatchIO>) -> Self {
        self.watch = Some(watch);
        self
    }

    pub fn no_watch(mut self) -> Self {
        self.watch = None;
        self
    }

    pub fn add_backend<E: Into<SmolStr>>(mut self, extension: E, backend: Rc<dyn Backend>) -> Self {
        self.backends.insert(extension, backend);
        self
    }

    pub fn default_backend(mut self, backend: Rc<dyn Backend>) -> Self {
        self.backends.set_default(backend);
        self
    }

    /// Skip entries called `name` when scanning.
    pub fn ignore<N: Into<SmolStr>>(mut self, name: N) -> Self {
        self.filter.ignored.push(name.into());
        self
    }

    /// Replace the list of skipped entry names.
    pub fn ignore_only<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<SmolStr>,
    {
        self.filter.ignored = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn include_hidden(mut self, include: bool) -> Self {
        self.filter.include_hidden = include;
        self
    }

    pub fn build(self) -> Rc<Host> {
        Rc::new(Host {
            io: self.io,
            watch: self.watch,
            backends: self.backends,
            filter: self.filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::plain("n1", true)]
    #[case::hidden(".hidden", false)]
    #[case::vendored("node_modules", false)]
    #[case::build_output("target", false)]
    #[case::nested_name("node_modules_docs", true)]
    fn default_filter(#[case] name: &str, #[case] admitted: bool) {
        assert_eq!(ScanFilter::default().admits(name), admitted);
    }

    #[test]
    fn hidden_entries_can_be_included() {
        let host = HostBuilder::new(Rc::new(crate::io::DummyIO))
            .include_hidden(true)
            .ignore("vendor")
            .build();

        assert!(host.filter().admits(".env"));
        assert!(!host.filter().admits("vendor"));
    }
}
