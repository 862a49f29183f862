//! Built-in functions of the nix dialect.
//!
//! Most builtins are pure. The impure ones (`readFile`, `pathExists`,
//! `import`) go through the [`TreeIO`] of the unit they are called
//! from, and resolve relative paths against the unit's directory.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use glagol_eval::{Attrs, Builtin, Context, ErrorKind, EvalResult, Leaf, TreeIO, Value};
use itertools::Itertools;
use smol_str::SmolStr;
use tracing::{debug, info};

use super::interp::{attrs_of, binary, DepthGuard};
use super::ir::BinaryOp;
use super::NixBackend;

/// Builtins that are also visible without the `builtins.` prefix.
const GLOBALS: &[&str] = &[
    "abort",
    "baseNameOf",
    "dirOf",
    "import",
    "isNull",
    "map",
    "removeAttrs",
    "throw",
    "toString",
];

/// Type name as the dialect reports it. Tree views behave like sets.
fn type_of(value: &Value) -> &'static str {
    match value {
        Value::View(_) => "set",
        other => other.type_of(),
    }
}

fn index(list: &[Value], index: i64) -> EvalResult<Value> {
    usize::try_from(index)
        .ok()
        .and_then(|idx| list.get(idx))
        .cloned()
        .ok_or(ErrorKind::IndexOutOfBounds {
            index,
            length: list.len(),
        })
}

fn pure_builtins() -> Vec<Builtin> {
    vec![
        Builtin::new("abort", 1, |args| {
            Err(ErrorKind::Abort(args[0].coerce_to_string()?.to_string()))
        }),
        Builtin::new("add", 2, |mut args| {
            let rhs = args.pop().unwrap_or(Value::Null);
            let lhs = args.pop().unwrap_or(Value::Null);
            binary(BinaryOp::Add, lhs, rhs)
        }),
        Builtin::new("attrNames", 1, |args| {
            Ok(Value::list(
                args[0].attr_names()?.into_iter().map(Value::String).collect(),
            ))
        }),
        Builtin::new("attrValues", 1, |args| {
            Ok(Value::list(attrs_of(&args[0])?.into_values().collect()))
        }),
        Builtin::new("baseNameOf", 1, |args| {
            let path = args[0].coerce_to_string()?;
            let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
            Ok(Value::from(name))
        }),
        Builtin::new("concatLists", 1, |args| {
            let mut out = vec![];
            for list in args[0].to_list()?.iter() {
                out.extend(list.to_list()?.iter().cloned());
            }
            Ok(Value::list(out))
        }),
        Builtin::new("concatStringsSep", 2, |args| {
            let separator = args[0].to_str()?;
            let strings = args[1]
                .to_list()?
                .iter()
                .map(Value::coerce_to_string)
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::from(strings.iter().join(&separator)))
        }),
        Builtin::new("dirOf", 1, |args| {
            let path = args[0].coerce_to_string()?;
            let dir = match path.trim_end_matches('/').rsplit_once('/') {
                Some(("", _)) => "/",
                Some((dir, _)) => dir,
                None => ".",
            };
            Ok(Value::from(dir))
        }),
        Builtin::new("div", 2, |mut args| {
            let rhs = args.pop().unwrap_or(Value::Null);
            let lhs = args.pop().unwrap_or(Value::Null);
            binary(BinaryOp::Div, lhs, rhs)
        }),
        Builtin::new("elem", 2, |args| {
            let found = args[1].to_list()?.iter().any(|item| item.equals(&args[0]));
            Ok(Value::Bool(found))
        }),
        Builtin::new("elemAt", 2, |args| index(&args[0].to_list()?, args[1].as_int()?)),
        Builtin::new("filter", 2, |args| {
            let mut out = vec![];
            for item in args[1].to_list()?.iter() {
                if args[0].call(item.clone())?.as_bool()? {
                    out.push(item.clone());
                }
            }
            Ok(Value::list(out))
        }),
        Builtin::new("foldl'", 3, |args| {
            let mut acc = args[1].clone();
            for item in args[2].to_list()?.iter() {
                acc = args[0].call(acc)?.call(item.clone())?;
            }
            Ok(acc)
        }),
        Builtin::new("fromJSON", 1, |args| Value::parse_json(&args[0].to_str()?)),
        Builtin::new("genList", 2, |args| {
            let length = args[1].as_int()?;
            let mut out = vec![];
            for idx in 0..length.max(0) {
                out.push(args[0].call(Value::Integer(idx))?);
            }
            Ok(Value::list(out))
        }),
        Builtin::new("getAttr", 2, |args| args[1].select_required(&args[0].to_str()?)),
        Builtin::new("getEnv", 1, |args| {
            Ok(Value::from(
                std::env::var(args[0].to_str()?.as_str()).unwrap_or_default(),
            ))
        }),
        Builtin::new("hasAttr", 2, |args| {
            Ok(Value::Bool(args[1].select(&args[0].to_str()?)?.is_some()))
        }),
        Builtin::new("head", 1, |args| index(&args[0].to_list()?, 0)),
        Builtin::new("isAttrs", 1, |args| Ok(Value::Bool(args[0].is_attrs()))),
        Builtin::new("isBool", 1, |args| Ok(Value::Bool(matches!(args[0], Value::Bool(_))))),
        Builtin::new("isFloat", 1, |args| Ok(Value::Bool(matches!(args[0], Value::Float(_))))),
        Builtin::new("isFunction", 1, |args| Ok(Value::Bool(args[0].is_function()))),
        Builtin::new("isInt", 1, |args| Ok(Value::Bool(matches!(args[0], Value::Integer(_))))),
        Builtin::new("isList", 1, |args| Ok(Value::Bool(matches!(args[0], Value::List(_))))),
        Builtin::new("isNull", 1, |args| Ok(Value::Bool(args[0].is_null()))),
        Builtin::new("isString", 1, |args| {
            Ok(Value::Bool(matches!(args[0], Value::String(_))))
        }),
        Builtin::new("length", 1, |args| {
            Ok(Value::Integer(args[0].to_list()?.len() as i64))
        }),
        Builtin::new("lessThan", 2, |mut args| {
            let rhs = args.pop().unwrap_or(Value::Null);
            let lhs = args.pop().unwrap_or(Value::Null);
            binary(BinaryOp::Less, lhs, rhs)
        }),
        Builtin::new("listToAttrs", 1, |args| {
            let mut attrs = Attrs::new();
            for item in args[0].to_list()?.iter() {
                let name = item.select_required("name")?.to_str()?;
                let value = item.select_required("value")?;
                // the first occurrence of a name wins
                attrs.entry(name).or_insert(value);
            }
            Ok(Value::attrs(attrs))
        }),
        Builtin::new("map", 2, |args| {
            let items = args[1]
                .to_list()?
                .iter()
                .map(|item| args[0].call(item.clone()))
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::list(items))
        }),
        Builtin::new("mapAttrs", 2, |args| {
            let mut out = Attrs::new();
            for (name, value) in attrs_of(&args[1])? {
                let mapped = args[0].call(Value::String(name.clone()))?.call(value)?;
                out.insert(name, mapped);
            }
            Ok(Value::attrs(out))
        }),
        Builtin::new("mul", 2, |mut args| {
            let rhs = args.pop().unwrap_or(Value::Null);
            let lhs = args.pop().unwrap_or(Value::Null);
            binary(BinaryOp::Mul, lhs, rhs)
        }),
        Builtin::new("removeAttrs", 2, |args| {
            let mut attrs = attrs_of(&args[0])?;
            for name in args[1].to_list()?.iter() {
                attrs.remove(&name.to_str()?);
            }
            Ok(Value::attrs(attrs))
        }),
        Builtin::new("seq", 2, |args| Ok(args[1].clone())),
        Builtin::new("stringLength", 1, |args| {
            Ok(Value::Integer(args[0].to_str()?.len() as i64))
        }),
        Builtin::new("sub", 2, |mut args| {
            let rhs = args.pop().unwrap_or(Value::Null);
            let lhs = args.pop().unwrap_or(Value::Null);
            binary(BinaryOp::Sub, lhs, rhs)
        }),
        Builtin::new("substring", 3, |args| {
            let s = args[2].to_str()?;
            let start = usize::try_from(args[0].as_int()?).unwrap_or(0).min(s.len());
            let end = match usize::try_from(args[1].as_int()?) {
                Ok(len) => start.saturating_add(len).min(s.len()),
                // a negative length takes the rest of the string
                Err(_) => s.len(),
            };
            Ok(Value::from(
                String::from_utf8_lossy(&s.as_bytes()[start..end]).into_owned(),
            ))
        }),
        Builtin::new("tail", 1, |args| {
            let list = args[0].to_list()?;
            if list.is_empty() {
                return Err(ErrorKind::IndexOutOfBounds {
                    index: 0,
                    length: 0,
                });
            }
            Ok(Value::list(list[1..].to_vec()))
        }),
        Builtin::new("throw", 1, |args| {
            Err(ErrorKind::Throw(args[0].coerce_to_string()?.to_string()))
        }),
        Builtin::new("toJSON", 1, |args| {
            let json = args[0].to_json()?;
            Ok(Value::from(json.to_string()))
        }),
        Builtin::new("toString", 1, |args| Ok(Value::String(args[0].coerce_to_string()?))),
        Builtin::new("trace", 2, |args| {
            info!(target: "glagol::trace", "trace: {}", args[0]);
            Ok(args[1].clone())
        }),
        Builtin::new("typeOf", 1, |args| Ok(Value::from(type_of(&args[0])))),
    ]
}

/// Resolve `path` against the directory of the calling unit.
fn resolve(base: Option<&Path>, path: &str) -> PathBuf {
    match base {
        Some(base) => base.join(path),
        None => PathBuf::from(path),
    }
}

fn io_error(path: PathBuf, error: std::io::Error) -> ErrorKind {
    ErrorKind::Io {
        path,
        error: Rc::new(error),
    }
}

fn impure_builtins(io: Rc<dyn TreeIO>, base: Option<PathBuf>) -> Vec<Builtin> {
    let base = Rc::new(base);

    let read_file = {
        let (io, base) = (io.clone(), base.clone());
        Builtin::new("readFile", 1, move |args| {
            let path = resolve(base.as_deref(), &args[0].to_str()?);
            io.read_to_string(&path)
                .map(Value::from)
                .map_err(|err| io_error(path, err))
        })
    };

    let path_exists = {
        let (io, base) = (io.clone(), base.clone());
        Builtin::new("pathExists", 1, move |args| {
            let path = resolve(base.as_deref(), &args[0].to_str()?);
            io.path_exists(&path)
                .map(Value::Bool)
                .map_err(|err| io_error(path, err))
        })
    };

    // Strings are imported as files: directories import their
    // `default.nix`. Any other value was already resolved through the
    // tree (e.g. `import ./lib`) and is returned as it is.
    let import = Builtin::new("import", 1, move |args| {
        let target = match &args[0] {
            Value::String(path) => resolve(base.as_deref(), path),
            other => return Ok(other.clone()),
        };

        let path = match io.file_type(&target) {
            Ok(glagol_eval::FileType::Directory) => target.join("default.nix"),
            _ => target,
        };

        let _guard = DepthGuard::enter()?;
        debug!(path = %path.display(), "importing file");
        let leaf = Leaf::with_backend(io.clone(), Rc::new(NixBackend), Some(path), None);
        Ok(leaf.value()?.unwrap_or(Value::Null))
    });

    vec![read_file, path_exists, import]
}

fn current_time() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(dur) => dur.as_secs() as i64,

        // This case is hit if the system time is *before* epoch.
        Err(err) => -(err.duration().as_secs() as i64),
    }
}

/// Build the execution context of a nix unit: the `builtins` set, the
/// global aliases of some builtins and the unit's own location.
pub(super) fn context_for(leaf: &Leaf) -> Context {
    let base = leaf.path().and_then(Path::parent).map(Path::to_path_buf);

    let mut builtins: Attrs = pure_builtins()
        .into_iter()
        .chain(impure_builtins(leaf.io().clone(), base))
        .map(|builtin| (SmolStr::new(builtin.name()), Value::from(builtin)))
        .collect();

    // currentTime pins the time at which the unit was executed
    builtins.insert("currentTime".into(), Value::Integer(current_time()));
    builtins.insert("true".into(), Value::Bool(true));
    builtins.insert("false".into(), Value::Bool(false));
    builtins.insert("null".into(), Value::Null);

    let mut context = Context::new();
    for name in GLOBALS.iter().chain(&["true", "false", "null"]) {
        if let Some(value) = builtins.get(*name) {
            context.bind(*name, value.clone());
        }
    }

    if let Some(path) = leaf.path() {
        context.bind("__filename", Value::from(path.to_string_lossy().as_ref()));
        if let Some(dir) = path.parent() {
            context.bind("__dirname", Value::from(dir.to_string_lossy().as_ref()));
        }
    }

    context.bind("builtins", Value::attrs(builtins));
    context
}
