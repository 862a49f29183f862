use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use glagol_eval::{Directory, ErrorKind, Host, Node, StdIO, Value};
use glagol_glue::NotifyWatchIO;
use tracing::{debug, instrument};

pub mod args;

pub use args::Args;

pub const USAGE: &str = "usage:\n  glagol <dir>\n  glagol <file>\n  glagol <dir> <file>";

/// How often the tree is synchronised with the disk in `--watch` mode.
const WATCH_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown dialect '{0}'")]
    UnknownDialect(String),

    #[error("'{}' is a file, so no unit path can be given after it", .0.display())]
    NotADirectory(PathBuf),

    #[error("could not resolve '{}': {error}", path.display())]
    Resolve {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error(transparent)]
    Eval(#[from] ErrorKind),
}

/// What the positional arguments point at.
#[derive(Debug, PartialEq, Eq)]
pub enum Target {
    /// Nothing was given.
    Usage,

    /// The given path does not exist.
    Missing(PathBuf),

    /// Root directory of the tree and the path of the unit to evaluate
    /// inside of it. Without a unit, the root itself is summarised.
    Tree { root: PathBuf, unit: Option<PathBuf> },
}

impl Target {
    pub fn from_args(args: &Args) -> Result<Target, Error> {
        let target = match &args.target {
            None => return Ok(Target::Usage),
            Some(target) => target,
        };

        if !target.exists() {
            return Ok(Target::Missing(target.clone()));
        }

        let resolved = std::fs::canonicalize(target).map_err(|error| Error::Resolve {
            path: target.clone(),
            error,
        })?;

        if resolved.is_dir() {
            return Ok(Target::Tree {
                root: resolved,
                unit: args.file.clone(),
            });
        }

        if args.file.is_some() {
            return Err(Error::NotADirectory(target.clone()));
        }

        match (resolved.parent(), resolved.file_name()) {
            (Some(root), Some(name)) => Ok(Target::Tree {
                root: root.to_path_buf(),
                unit: Some(PathBuf::from(name)),
            }),
            _ => Ok(Target::Tree {
                root: resolved,
                unit: None,
            }),
        }
    }
}

pub struct RunResult {
    output: String,
    errors: String,
    success: bool,
}

impl RunResult {
    fn new() -> Self {
        RunResult {
            output: String::new(),
            errors: String::new(),
            success: true,
        }
    }

    fn fail(mut self, message: impl std::fmt::Display) -> Self {
        let _ = writeln!(&mut self.errors, "error: {}", message);
        self.success = false;
        self
    }

    /// Print the collected output and errors, returning whether the
    /// run succeeded.
    pub fn finalize(self) -> bool {
        print!("{}", self.output);
        eprint!("{}", self.errors);
        self.success
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn errors(&self) -> &str {
        &self.errors
    }

    pub fn success(&self) -> bool {
        self.success
    }
}

/// Build the host described by the command-line flags.
pub fn make_host(args: &Args) -> Result<Rc<Host>, Error> {
    let default = glagol_glue::backend_for_dialect(&args.default_dialect)
        .ok_or_else(|| Error::UnknownDialect(args.default_dialect.clone()))?;

    let mut builder = glagol_glue::standard_host(Rc::new(StdIO))
        .default_backend(default)
        .include_hidden(args.include_hidden);

    for name in args.ignore.iter().filter(|name| !name.is_empty()) {
        builder = builder.ignore(name.as_str());
    }

    if !args.no_watch {
        builder = builder.watch_with(Rc::new(NotifyWatchIO::new()));
    }

    Ok(builder.build())
}

/// Evaluate the unit at `unit` below `root` (or summarise the root if
/// there is none) and render the result the way the flags ask for.
#[instrument(skip_all, fields(root = %root.path().display(), unit = ?unit))]
pub fn evaluate(root: &Rc<Directory>, unit: Option<&Path>, args: &Args) -> RunResult {
    let result = RunResult::new();

    let unit = match unit {
        Some(unit) => unit,
        None => return summarise(root, result),
    };

    let node = match Node::from(root.clone()).descend(unit) {
        Ok(node) => node,
        Err(err) => return result.fail(err),
    };

    let value = match node.value() {
        Ok(Some(value)) => value,
        Ok(None) => return result,
        Err(err) => return report(&node, err, result),
    };

    // a unit evaluating to a function is a program taking the tree
    let value = match value {
        Value::Function(_) => {
            debug!("calling the unit's function with the root view");
            match root.view().and_then(|view| value.call(Value::View(view))) {
                Ok(value) => value,
                Err(err) => return report(&node, err, result),
            }
        }
        value => value,
    };

    render(&value, args, result)
}

fn summarise(root: &Rc<Directory>, mut result: RunResult) -> RunResult {
    let mut children = root.children();
    children.sort_by(|a, b| a.name().cmp(b.name()));

    for child in children {
        let _ = match &child {
            Node::Directory(_) => writeln!(&mut result.output, "{}/", child.name()),
            Node::Leaf(leaf) => writeln!(&mut result.output, "{} :: {}", child.name(), leaf.dialect()),
        };
    }

    result
}

fn render(value: &Value, args: &Args, mut result: RunResult) -> RunResult {
    if args.json {
        match value.to_json().map(|json| serde_json::to_string_pretty(&json)) {
            Ok(Ok(json)) => {
                let _ = writeln!(&mut result.output, "{}", json);
            }
            Ok(Err(err)) => return result.fail(err),
            Err(err) => return result.fail(err),
        }
    } else if args.raw {
        match value.coerce_to_string() {
            Ok(raw) => {
                let _ = writeln!(&mut result.output, "{}", raw);
            }
            Err(err) => return result.fail(err),
        }
    } else {
        let _ = writeln!(&mut result.output, "=> {} :: {}", value, value.type_of());
    }

    result
}

/// Report a failed evaluation. Compile errors of the evaluated unit
/// itself are rendered as a diagnostic against its source.
fn report(node: &Node, err: ErrorKind, mut result: RunResult) -> RunResult {
    if let (ErrorKind::Compile(compile), Some(leaf)) = (err.root_cause(), node.as_leaf()) {
        if compile.unit == *leaf.name() {
            if let Ok(Some(source)) = leaf.source() {
                result.errors.push_str(&compile.fancy_format_str(&source));
                result.success = false;
                return result;
            }
        }
    }

    let trace = err.unit_trace().join(" -> ");
    let mut result = result.fail(&err);
    if err.unit_trace().len() > 1 {
        let _ = writeln!(&mut result.errors, "note: while evaluating {}", trace);
    }

    result
}

/// Entry point of the `glagol` binary, minus the printing.
///
/// With `--watch` this prints every result itself and never returns.
pub fn run(args: &Args) -> RunResult {
    let (root, unit) = match Target::from_args(args) {
        Ok(Target::Usage) => {
            let mut result = RunResult::new();
            let _ = writeln!(&mut result.output, "{}", USAGE);
            return result;
        }

        Ok(Target::Missing(path)) => {
            let mut result = RunResult::new();
            let _ = writeln!(&mut result.output, "\"{}\" doesn't seem to exist.", path.display());
            result.success = false;
            return result;
        }

        Ok(Target::Tree { root, unit }) => (root, unit),
        Err(err) => return RunResult::new().fail(err),
    };

    let tree = match make_host(args).and_then(|host| host.open(&root).map_err(Error::from)) {
        Ok(tree) => tree,
        Err(err) => return RunResult::new().fail(err),
    };

    let result = evaluate(&tree, unit.as_deref(), args);
    if !args.watch {
        return result;
    }

    // everything below only returns when the process is killed
    let mut result = result;
    loop {
        result.finalize();
        result = loop {
            std::thread::sleep(WATCH_INTERVAL);
            let changed = tree.sync();
            if changed > 0 {
                debug!(changed, "tree changed on disk, evaluating again");
                break evaluate(&tree, unit.as_deref(), args);
            }
        };
    }
}
