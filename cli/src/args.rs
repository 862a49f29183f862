use std::path::PathBuf;

use clap::{builder::PossibleValuesParser, Parser};
use tracing::Level;

/// Evaluates a unit of a live evaluation tree.
///
/// Every file below the root directory is a unit of code whose value
/// can refer to the values of the other units through relative paths.
/// Files with a `.json`, `.txt` or `.md` extension are read as JSON or
/// plain text, all other files use the default dialect.
///
/// The CLI interface is not stable and subject to change.
#[derive(Parser, Clone, Debug)]
#[command(name = "glagol")]
pub struct Args {
    /// A global log level to use when printing logs.
    /// It's also possible to set `RUST_LOG` according to
    /// `tracing_subscriber::filter::EnvFilter`, which will always have
    /// priority.
    #[arg(long, default_value_t = Level::WARN)]
    pub log_level: Level,

    /// A directory, or a file whose directory becomes the root of the
    /// tree.
    pub target: Option<PathBuf>,

    /// Path of the unit to evaluate, relative to a directory TARGET.
    pub file: Option<PathBuf>,

    /// Dialect of files without a known extension.
    #[arg(
        long,
        env = "GLAGOL_DEFAULT_DIALECT",
        default_value = "nix",
        value_parser = PossibleValuesParser::new(glagol_glue::DIALECTS.iter().copied()),
    )]
    pub default_dialect: String,

    /// Additional directory entry names to skip while scanning, on top
    /// of `node_modules` and `target`.
    #[arg(long, env = "GLAGOL_IGNORE", value_delimiter = ',')]
    pub ignore: Vec<String>,

    /// Also scan entries whose names start with a dot.
    #[arg(long)]
    pub include_hidden: bool,

    /// Don't subscribe to filesystem changes.
    #[arg(long, env = "GLAGOL_NO_WATCH")]
    pub no_watch: bool,

    /// Keep running and print the value again whenever the tree
    /// changes on disk.
    #[arg(long, conflicts_with = "no_watch")]
    pub watch: bool,

    /// Print "raw" (unquoted) output.
    #[arg(long, conflicts_with = "json")]
    pub raw: bool,

    /// Print the value as JSON.
    #[arg(long)]
    pub json: bool,
}
