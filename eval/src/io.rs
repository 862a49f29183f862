//! Interface for injecting filesystem access into glagol.
//!
//! Directories scan their entries and leaves load their source text
//! through the [`TreeIO`] trait, so that the tree itself does not
//! depend on any particular filesystem model. Callers pick the
//! implementation when building a [`crate::Host`]; tests can provide
//! an in-memory one.

use std::ffi::OsString;
use std::io;
use std::path::Path;

#[cfg(feature = "impure")]
use std::fs;

/// Types of directory entries as far as the tree is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Directory,
    Regular,
    Symlink,
    Unknown,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let type_as_str = match &self {
            FileType::Directory => "directory",
            FileType::Regular => "regular",
            FileType::Symlink => "symlink",
            FileType::Unknown => "unknown",
        };

        write!(f, "{}", type_as_str)
    }
}

/// Represents all filesystem interactions the evaluation tree needs.
pub trait TreeIO {
    /// Verify whether the file at the specified path exists.
    fn path_exists(&self, path: &Path) -> io::Result<bool>;

    /// Return the [FileType] of the given path, or an error if it doesn't
    /// exist. Symlinks to regular files are followed. Links to
    /// directories and dangling links are reported as
    /// [FileType::Symlink], so that scanning never walks into a cycle.
    fn file_type(&self, path: &Path) -> io::Result<FileType>;

    /// Read the directory at the specified path and return the names
    /// of its entries associated with their [`FileType`].
    fn read_dir(&self, path: &Path) -> io::Result<Vec<(OsString, FileType)>>;

    /// Read the file at the specified path to a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;
}

#[cfg(feature = "impure")]
fn classify(metadata: &fs::Metadata) -> FileType {
    let file_type = metadata.file_type();
    if file_type.is_dir() {
        FileType::Directory
    } else if file_type.is_file() {
        FileType::Regular
    } else if file_type.is_symlink() {
        FileType::Symlink
    } else {
        FileType::Unknown
    }
}

/// Implementation of [`TreeIO`] that simply uses the equivalent
/// standard library functions, i.e. does local file-IO.
#[cfg(feature = "impure")]
pub struct StdIO;

#[cfg(feature = "impure")]
impl TreeIO for StdIO {
    fn path_exists(&self, path: &Path) -> io::Result<bool> {
        // In general, an IO error indicates the path doesn't exist
        Ok(path.try_exists().unwrap_or(false))
    }

    fn file_type(&self, path: &Path) -> io::Result<FileType> {
        let link = fs::symlink_metadata(path)?;
        if !link.file_type().is_symlink() {
            return Ok(classify(&link));
        }

        match fs::metadata(path).map(|target| classify(&target)) {
            Ok(FileType::Regular) => Ok(FileType::Regular),
            _ => Ok(FileType::Symlink),
        }
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<(OsString, FileType)>> {
        let mut result = vec![];

        for entry in path.read_dir()? {
            let entry = entry?;

            // entries may vanish between listing and stat'ing them
            let file_type = match self.file_type(&entry.path()) {
                Ok(file_type) => file_type,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err),
            };

            result.push((entry.file_name(), file_type))
        }

        Ok(result)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }
}

/// Dummy implementation of [`TreeIO`], can be used in contexts where
/// IO is not available. Directories opened through it are empty and
/// leaves can only be given literal source.
pub struct DummyIO;

fn unsupported<T>() -> io::Result<T> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "I/O methods are not implemented in DummyIO",
    ))
}

impl TreeIO for DummyIO {
    fn path_exists(&self, _: &Path) -> io::Result<bool> {
        Ok(false)
    }

    fn file_type(&self, _: &Path) -> io::Result<FileType> {
        unsupported()
    }

    fn read_dir(&self, _: &Path) -> io::Result<Vec<(OsString, FileType)>> {
        unsupported()
    }

    fn read_to_string(&self, _: &Path) -> io::Result<String> {
        unsupported()
    }
}

#[cfg(all(test, feature = "impure"))]
mod tests {
    use super::*;

    #[test]
    fn std_io_lists_entries_with_types() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), "1").unwrap();
        fs::create_dir(dir.path().join("b")).unwrap();

        let mut entries = StdIO.read_dir(dir.path()).unwrap();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            entries,
            vec![
                (OsString::from("a"), FileType::Regular),
                (OsString::from("b"), FileType::Directory),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn std_io_follows_symlinks_to_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target"), "1").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("link")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("up")).unwrap();

        assert_eq!(
            StdIO.file_type(&dir.path().join("link")).unwrap(),
            FileType::Regular
        );
        assert_eq!(
            StdIO.file_type(&dir.path().join("dangling")).unwrap(),
            FileType::Symlink
        );
        assert_eq!(
            StdIO.file_type(&dir.path().join("up")).unwrap(),
            FileType::Symlink
        );
        assert_eq!(StdIO.file_type(dir.path()).unwrap(), FileType::Directory);
    }

    #[test]
    fn dummy_io_reports_nothing_exists() {
        assert!(!DummyIO.path_exists(Path::new("/")).unwrap());
        assert!(DummyIO.read_dir(Path::new("/")).is_err());
    }
}
