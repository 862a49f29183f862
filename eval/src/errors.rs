use std::error;
use std::fmt::{self, Display};
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use codemap::{CodeMap, File};
use codemap_diagnostic::{ColorConfig, Diagnostic, Emitter, Level, SpanLabel, SpanStyle};
use smol_str::SmolStr;

/// A position inside of a unit's source code. Both fields are
/// 1-indexed, as users expect them to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Raised by a backend that rejects the source text of a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileError {
    pub dialect: &'static str,
    pub unit: SmolStr,
    pub message: String,
    pub location: Option<Location>,

    /// Byte range of the offending code, if the backend could
    /// determine it.
    pub span: Option<(u32, u32)>,
}

impl CompileError {
    pub fn new<U: Into<SmolStr>, M: Into<String>>(dialect: &'static str, unit: U, message: M) -> Self {
        CompileError {
            dialect,
            unit: unit.into(),
            message: message.into(),
            location: None,
            span: None,
        }
    }

    /// Attach the byte range `start..end` of `source` to this error,
    /// resolving it to a line and column.
    pub fn with_span(mut self, source: &str, start: u32, end: u32) -> Self {
        let len = source.len() as u32;
        let (start, end) = (start.min(len), end.min(len).max(start.min(len)));

        let mut codemap = CodeMap::new();
        let file = codemap.add_file(self.unit.to_string(), source.to_owned());
        let span = file.span.subspan(start as u64, end as u64);
        let begin = codemap.look_up_span(span).begin;

        // lines and columns are 0-indexed in the codemap
        self.location = Some(Location {
            line: begin.line + 1,
            column: begin.column + 1,
        });
        self.span = Some((start, end));
        self
    }

    /// Attach an already known line and column to this error.
    pub fn with_location(mut self, line: usize, column: usize) -> Self {
        self.location = Some(Location { line, column });
        self
    }

    fn diagnostic(&self, file: &File) -> Diagnostic {
        let spans = match self.span {
            Some((start, end)) => vec![SpanLabel {
                span: file.span.subspan(start as u64, end as u64),
                label: None,
                style: SpanStyle::Primary,
            }],
            _ => vec![],
        };

        Diagnostic {
            level: Level::Error,
            message: format!("{} compile error in '{}': {}", self.dialect, self.unit, self.message),
            code: Some("E001".into()),
            spans,
        }
    }

    fn codemap_for(&self, source: &str) -> (CodeMap, Arc<File>) {
        let mut codemap = CodeMap::new();
        let file = codemap.add_file(self.unit.to_string(), source.to_owned());
        (codemap, file)
    }

    /// Render a fancy, human-readable report of this error against
    /// the source code it was raised for. The output does not include
    /// any colours or font styles.
    pub fn fancy_format_str(&self, source: &str) -> String {
        let (codemap, file) = self.codemap_for(source);
        let mut out = vec![];
        Emitter::vec(&mut out, Some(&codemap)).emit(&[self.diagnostic(&file)]);
        String::from_utf8_lossy(&out).to_string()
    }

    /// Render a fancy report of this error and print it to stderr,
    /// using colours if the terminal supports them.
    pub fn fancy_format_stderr(&self, source: &str) {
        let (codemap, file) = self.codemap_for(source);
        Emitter::stderr(ColorConfig::Auto, Some(&codemap)).emit(&[self.diagnostic(&file)]);
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} compile error in '{}'", self.dialect, self.unit)?;
        if let Some(location) = self.location {
            write!(f, " at {}", location)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl error::Error for CompileError {}

#[derive(Clone, Debug, thiserror::Error)]
pub enum ErrorKind {
    /// A path segment did not match any child of a directory.
    #[error("no node named '{name}' in '{}'", dir.display())]
    NotFound { name: SmolStr, dir: PathBuf },

    /// A view was requested for a node that is not attached to a
    /// tree.
    #[error("node '{name}' is not connected to a tree")]
    Unconnected { name: SmolStr },

    #[error(transparent)]
    Compile(#[from] CompileError),

    /// Executing a unit failed, either by failing directly or by
    /// reporting an error through its execution context.
    #[error("evaluation of '{unit}' failed: {cause}")]
    Compute {
        unit: SmolStr,
        #[source]
        cause: Box<ErrorKind>,
    },

    /// A tree walk encountered a node whose structural links are
    /// broken, e.g. a node that was removed from its directory.
    #[error("foreign body in tree, possible name: '{name}'")]
    UnsupportedNode { name: SmolStr },

    #[error("cannot set '{key}': tree views are read-only")]
    Immutable { key: SmolStr },

    /// The value of a unit was requested while that same value was
    /// being computed.
    #[error("infinite recursion: '{unit}' was requested while it was being computed")]
    Cycle { unit: SmolStr },

    #[error("I/O error at '{}': {error}", path.display())]
    Io { path: PathBuf, error: Rc<io::Error> },

    /// Compiled code of one dialect was handed to another dialect's
    /// backend.
    #[error("cannot execute code compiled by the '{actual}' backend with the '{expected}' backend")]
    ForeignCompiled {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("expected value of type '{expected}', but found a '{actual}'")]
    TypeError {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("attribute '{name}' not found")]
    AttributeNotFound { name: SmolStr },

    #[error("variable '{0}' is undefined")]
    UnknownVariable(SmolStr),

    #[error("cannot call a value of type '{0}'")]
    NotCallable(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("list index {index} is out of bounds for a list of length {length}")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("cannot coerce a '{0}' to a string")]
    NotCoercibleToString(&'static str),

    #[error("cannot represent a '{0}' as JSON")]
    NotSerialisable(&'static str),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Infinite recursion inside of a single unit's code.
    #[error("infinite recursion encountered")]
    InfiniteRecursion,

    #[error("assertion failed")]
    AssertionFailed,

    /// Error explicitly raised by user code.
    #[error("{0}")]
    Throw(String),

    #[error("evaluation aborted: {0}")]
    Abort(String),

    /// Backend-specific error that has no representation in this
    /// enum.
    #[error("{0}")]
    Native(Rc<dyn error::Error>),
}

impl ErrorKind {
    pub(crate) fn io<P: Into<PathBuf>>(path: P, error: io::Error) -> Self {
        ErrorKind::Io {
            path: path.into(),
            error: Rc::new(error),
        }
    }

    /// Return the innermost error, looking through any layers of
    /// failed unit evaluations.
    pub fn root_cause(&self) -> &ErrorKind {
        match self {
            ErrorKind::Compute { cause, .. } => cause.root_cause(),
            other => other,
        }
    }

    /// Names of the units whose evaluation failed, outermost first.
    pub fn unit_trace(&self) -> Vec<&str> {
        let mut units = vec![];
        let mut current = self;
        while let ErrorKind::Compute { unit, cause } = current {
            units.push(unit.as_str());
            current = cause;
        }
        units
    }
}

pub type EvalResult<T> = Result<T, ErrorKind>;
