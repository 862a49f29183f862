//! Lowering of rnix syntax trees into the owned [`Ir`].
//!
//! Lowering is where all static checks of the dialect happen: parse
//! errors, duplicate attributes and unsupported constructs (such as
//! search paths) are reported as [`CompileError`]s with the location of
//! the offending code.

use std::collections::BTreeMap;
use std::rc::Rc;

use glagol_eval::{CompileError, Value, PARENT_KEY, SELF_KEY};
use rnix::ast::{self, AstToken, HasEntry};
use rnix::parser::ParseError;
use rnix::SyntaxNode;
use rowan::ast::AstNode;
use smol_str::SmolStr;

use super::ir::{AttrKey, BinaryOp, Binding, Bindings, Ir, Lambda, Param, StrPart, UnaryOp};
use super::DIALECT;

type LowerResult<T = Rc<Ir>> = Result<T, CompileError>;

/// Parse `source` and lower it into its intermediate representation.
pub(crate) fn compile(source: &str, unit: &str) -> LowerResult {
    let parsed = ast::Root::parse(source);
    let errors = parsed.errors();

    if let Some(first) = errors.first() {
        let (start, end) = parse_error_range(first, source);
        let mut message = first.to_string();
        if errors.len() > 1 {
            message.push_str(&format!(" (and {} more parse errors)", errors.len() - 1));
        }

        return Err(CompileError::new(DIALECT, unit, message).with_span(source, start, end));
    }

    let lowerer = Lowerer { source, unit };
    let root = parsed.tree();
    let expr = lowerer.required(root.expr(), root.syntax())?;
    lowerer.lower(expr)
}

/// Byte range a parse error points at. Errors at the end of input
/// point at the end of the source.
fn parse_error_range(err: &ParseError, source: &str) -> (u32, u32) {
    let range = match err {
        ParseError::Unexpected(range)
        | ParseError::UnexpectedExtra(range)
        | ParseError::UnexpectedWanted(_, range, _)
        | ParseError::UnexpectedDoubleBind(range)
        | ParseError::DuplicatedArgs(range, _) => Some(*range),
        _ => None,
    };

    match range {
        Some(range) => (range.start().into(), range.end().into()),
        None => {
            let end = source.len() as u32;
            (end, end)
        }
    }
}

/// Bindings while they are collected. Nested attribute paths are
/// merged into nested sets before they become [`Bindings`].
#[derive(Default)]
struct PendingSet {
    entries: BTreeMap<SmolStr, Pending>,
    dynamic: Vec<(Rc<Ir>, Rc<Ir>)>,
}

enum Pending {
    Done(Binding),
    Nested(PendingSet),
}

fn finish(set: PendingSet) -> Bindings {
    let entries = set
        .entries
        .into_iter()
        .map(|(name, pending)| {
            let binding = match pending {
                Pending::Done(binding) => binding,
                Pending::Nested(nested) => Binding {
                    value: nested_attrs(nested),
                    outer: false,
                },
            };
            (name, binding)
        })
        .collect();

    Bindings {
        entries,
        dynamic: set.dynamic,
    }
}

fn nested_attrs(set: PendingSet) -> Rc<Ir> {
    Rc::new(Ir::Attrs {
        recursive: false,
        bindings: finish(set),
    })
}

struct Lowerer<'a> {
    source: &'a str,
    unit: &'a str,
}

impl Lowerer<'_> {
    fn error_at<M: Into<String>>(&self, node: &SyntaxNode, message: M) -> CompileError {
        let range = node.text_range();
        CompileError::new(DIALECT, self.unit, message).with_span(
            self.source,
            range.start().into(),
            range.end().into(),
        )
    }

    /// Children that the parser guarantees for error-free trees are
    /// still optional in the typed AST.
    fn required<T>(&self, child: Option<T>, parent: &SyntaxNode) -> LowerResult<T> {
        child.ok_or_else(|| self.error_at(parent, "incomplete expression"))
    }

    fn lower(&self, expr: ast::Expr) -> LowerResult {
        let ir = match expr {
            ast::Expr::Literal(literal) => self.lower_literal(&literal)?,
            ast::Expr::Path(path) => self.lower_path(&path)?,
            ast::Expr::Str(s) => return self.lower_str(&s),
            ast::Expr::Ident(ident) => Ir::Ident(self.ident_name(&ident)?),

            ast::Expr::List(list) => Ir::List(
                list.items()
                    .map(|item| self.lower(item))
                    .collect::<LowerResult<_>>()?,
            ),

            ast::Expr::AttrSet(attrs) => Ir::Attrs {
                recursive: attrs.rec_token().is_some(),
                bindings: self.lower_bindings(&attrs)?,
            },

            ast::Expr::LetIn(let_in) => {
                let bindings = self.lower_bindings(&let_in)?;
                if !bindings.dynamic.is_empty() {
                    return Err(self.error_at(let_in.syntax(), "dynamic attributes are not allowed in let"));
                }

                Ir::Let {
                    bindings,
                    body: self.lower(self.required(let_in.body(), let_in.syntax())?)?,
                }
            }

            // `let { a = 1; body = a; }` is a recursive set whose value
            // is its `body` attribute.
            ast::Expr::LegacyLet(legacy_let) => Ir::Select {
                target: Rc::new(Ir::Attrs {
                    recursive: true,
                    bindings: self.lower_bindings(&legacy_let)?,
                }),
                path: vec![AttrKey::Static("body".into())],
                default: None,
            },

            ast::Expr::With(with) => Ir::With {
                namespace: self.lower(self.required(with.namespace(), with.syntax())?)?,
                body: self.lower(self.required(with.body(), with.syntax())?)?,
            },

            ast::Expr::IfElse(if_else) => Ir::If {
                condition: self.lower(self.required(if_else.condition(), if_else.syntax())?)?,
                then: self.lower(self.required(if_else.body(), if_else.syntax())?)?,
                otherwise: self.lower(self.required(if_else.else_body(), if_else.syntax())?)?,
            },

            ast::Expr::Assert(assert) => Ir::Assert {
                condition: self.lower(self.required(assert.condition(), assert.syntax())?)?,
                body: self.lower(self.required(assert.body(), assert.syntax())?)?,
            },

            ast::Expr::Lambda(lambda) => self.lower_lambda(&lambda)?,

            ast::Expr::Apply(apply) => Ir::Apply {
                function: self.lower(self.required(apply.lambda(), apply.syntax())?)?,
                argument: self.lower(self.required(apply.argument(), apply.syntax())?)?,
            },

            ast::Expr::Select(select) => Ir::Select {
                target: self.lower(self.required(select.expr(), select.syntax())?)?,
                path: self.attr_path(self.required(select.attrpath(), select.syntax())?)?,
                default: match select.default_expr() {
                    Some(default) => Some(self.lower(default)?),
                    None => None,
                },
            },

            ast::Expr::HasAttr(has_attr) => Ir::HasAttr {
                target: self.lower(self.required(has_attr.expr(), has_attr.syntax())?)?,
                path: self.attr_path(self.required(has_attr.attrpath(), has_attr.syntax())?)?,
            },

            ast::Expr::UnaryOp(op) => Ir::Unary {
                op: match self.required(op.operator(), op.syntax())? {
                    ast::UnaryOpKind::Invert => UnaryOp::Not,
                    ast::UnaryOpKind::Negate => UnaryOp::Negate,
                },
                operand: self.lower(self.required(op.expr(), op.syntax())?)?,
            },

            ast::Expr::BinOp(op) => Ir::Binary {
                op: binary_op(self.required(op.operator(), op.syntax())?),
                lhs: self.lower(self.required(op.lhs(), op.syntax())?)?,
                rhs: self.lower(self.required(op.rhs(), op.syntax())?)?,
            },

            ast::Expr::Paren(paren) => return self.lower(self.required(paren.expr(), paren.syntax())?),
            ast::Expr::Root(root) => return self.lower(self.required(root.expr(), root.syntax())?),
            ast::Expr::Error(err) => return Err(self.error_at(err.syntax(), "syntax error")),
        };

        Ok(Rc::new(ir))
    }

    fn lower_literal(&self, node: &ast::Literal) -> LowerResult<Ir> {
        let value = match node.kind() {
            ast::LiteralKind::Float(f) => Value::Float(
                f.value()
                    .map_err(|err| self.error_at(node.syntax(), err.to_string()))?,
            ),
            ast::LiteralKind::Integer(i) => Value::Integer(
                i.value()
                    .map_err(|err| self.error_at(node.syntax(), err.to_string()))?,
            ),
            ast::LiteralKind::Uri(u) => Value::from(u.syntax().text()),
        };

        Ok(Ir::Literal(value))
    }

    /// Relative paths address the evaluation tree: `./a/b` selects
    /// `_.a.b` and every leading `..` moves one directory up through
    /// `__`. Absolute and home paths are plain strings.
    fn lower_path(&self, node: &ast::Path) -> LowerResult<Ir> {
        let raw = node.syntax().text().to_string();

        if raw.contains("${") {
            return Err(self.error_at(node.syntax(), "interpolated paths are not supported"));
        }

        if raw.starts_with('<') {
            return Err(self.error_at(node.syntax(), "search paths are not supported"));
        }

        if raw.starts_with('/') {
            return Ok(Ir::Literal(Value::from(raw)));
        }

        if let Some(rest) = raw.strip_prefix("~/") {
            let path = match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => raw.clone(),
            };
            return Ok(Ir::Literal(Value::from(path)));
        }

        let mut ups = 0;
        let mut segments: Vec<SmolStr> = vec![];
        for segment in raw.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        ups += 1;
                    }
                }
                name => segments.push(name.into()),
            }
        }

        let base = Ir::Ident(if ups == 0 { SELF_KEY } else { PARENT_KEY }.into());
        let path: Vec<AttrKey> = (1..ups)
            .map(|_| SmolStr::new(PARENT_KEY))
            .chain(segments)
            .map(AttrKey::Static)
            .collect();

        if path.is_empty() {
            return Ok(base);
        }

        Ok(Ir::Select {
            target: Rc::new(base),
            path,
            default: None,
        })
    }

    fn lower_str(&self, node: &ast::Str) -> LowerResult {
        let mut parts = vec![];
        for part in node.normalized_parts() {
            match part {
                ast::InterpolPart::Literal(lit) => parts.push(StrPart::Literal(lit)),
                ast::InterpolPart::Interpolation(ipol) => {
                    let expr = self.lower(self.required(ipol.expr(), ipol.syntax())?)?;
                    match &*expr {
                        Ir::Literal(Value::String(lit)) => parts.push(StrPart::Literal(lit.to_string())),
                        _ => parts.push(StrPart::Interpolation(expr)),
                    }
                }
            }
        }

        // strings without interpolation are constants
        if parts.iter().all(|part| matches!(part, StrPart::Literal(_))) {
            let mut out = String::new();
            for part in &parts {
                if let StrPart::Literal(lit) = part {
                    out.push_str(lit);
                }
            }
            return Ok(Rc::new(Ir::Literal(Value::from(out))));
        }

        Ok(Rc::new(Ir::Str(parts)))
    }

    fn ident_name(&self, ident: &ast::Ident) -> LowerResult<SmolStr> {
        let token = self.required(ident.ident_token(), ident.syntax())?;
        Ok(SmolStr::new(token.text()))
    }

    fn attr_key(&self, attr: ast::Attr) -> LowerResult<AttrKey> {
        match attr {
            ast::Attr::Ident(ident) => Ok(AttrKey::Static(self.ident_name(&ident)?)),
            ast::Attr::Str(s) => self.str_key(&s),
            ast::Attr::Dynamic(dynamic) => {
                match self.required(dynamic.expr(), dynamic.syntax())? {
                    ast::Expr::Str(s) => self.str_key(&s),
                    other => Ok(AttrKey::Dynamic(self.lower(other)?)),
                }
            }
        }
    }

    fn str_key(&self, node: &ast::Str) -> LowerResult<AttrKey> {
        let ir = self.lower_str(node)?;
        match &*ir {
            Ir::Literal(Value::String(name)) => Ok(AttrKey::Static(name.clone())),
            _ => Ok(AttrKey::Dynamic(ir)),
        }
    }

    fn attr_path(&self, path: ast::Attrpath) -> LowerResult<Vec<AttrKey>> {
        path.attrs().map(|attr| self.attr_key(attr)).collect()
    }

    fn lower_bindings<N: HasEntry>(&self, node: &N) -> LowerResult<Bindings> {
        let mut set = PendingSet::default();

        for inherit in node.inherits() {
            let from = match inherit.from() {
                Some(from) => Some(self.lower(self.required(from.expr(), from.syntax())?)?),
                None => None,
            };

            for attr in inherit.attrs() {
                let syntax = attr.syntax().clone();
                let name = match self.attr_key(attr)? {
                    AttrKey::Static(name) => name,
                    AttrKey::Dynamic(_) => {
                        return Err(self.error_at(&syntax, "dynamic attributes are not allowed in inherit"))
                    }
                };

                let binding = match &from {
                    Some(from) => Binding {
                        value: Rc::new(Ir::Select {
                            target: from.clone(),
                            path: vec![AttrKey::Static(name.clone())],
                            default: None,
                        }),
                        outer: false,
                    },
                    None => Binding {
                        value: Rc::new(Ir::Ident(name.clone())),
                        outer: true,
                    },
                };

                self.insert(&mut set, &syntax, vec![AttrKey::Static(name)], binding)?;
            }
        }

        for entry in node.attrpath_values() {
            let path = self.attr_path(self.required(entry.attrpath(), entry.syntax())?)?;
            let value = self.lower(self.required(entry.value(), entry.syntax())?)?;
            self.insert(
                &mut set,
                entry.syntax(),
                path,
                Binding {
                    value,
                    outer: false,
                },
            )?;
        }

        Ok(finish(set))
    }

    fn insert(
        &self,
        set: &mut PendingSet,
        node: &SyntaxNode,
        mut path: Vec<AttrKey>,
        binding: Binding,
    ) -> LowerResult<()> {
        if path.is_empty() {
            return Err(self.error_at(node, "empty attribute path"));
        }

        match path.remove(0) {
            AttrKey::Dynamic(key) if path.is_empty() => {
                set.dynamic.push((key, binding.value));
                Ok(())
            }

            AttrKey::Dynamic(key) => {
                let mut nested = PendingSet::default();
                self.insert(&mut nested, node, path, binding)?;
                set.dynamic.push((key, nested_attrs(nested)));
                Ok(())
            }

            AttrKey::Static(name) if path.is_empty() => {
                if set.entries.contains_key(&name) {
                    return Err(self.error_at(node, format!("attribute '{}' is already defined", name)));
                }
                set.entries.insert(name, Pending::Done(binding));
                Ok(())
            }

            AttrKey::Static(name) => {
                let pending = set
                    .entries
                    .entry(name.clone())
                    .or_insert_with(|| Pending::Nested(PendingSet::default()));

                match pending {
                    Pending::Nested(nested) => self.insert(nested, node, path, binding),
                    Pending::Done(_) => {
                        Err(self.error_at(node, format!("attribute '{}' is already defined", name)))
                    }
                }
            }
        }
    }

    fn lower_lambda(&self, node: &ast::Lambda) -> LowerResult<Ir> {
        let param = match self.required(node.param(), node.syntax())? {
            ast::Param::IdentParam(param) => {
                Param::Ident(self.ident_name(&self.required(param.ident(), param.syntax())?)?)
            }

            ast::Param::Pattern(pattern) => {
                let bind = match pattern.pat_bind() {
                    Some(bind) => Some(self.ident_name(&self.required(bind.ident(), bind.syntax())?)?),
                    None => None,
                };

                let mut entries = vec![];
                for entry in pattern.pat_entries() {
                    let name = self.ident_name(&self.required(entry.ident(), entry.syntax())?)?;
                    let default = match entry.default() {
                        Some(default) => Some(self.lower(default)?),
                        None => None,
                    };
                    entries.push((name, default));
                }

                Param::Pattern {
                    entries,
                    ellipsis: pattern.ellipsis_token().is_some(),
                    bind,
                }
            }
        };

        let body = self.lower(self.required(node.body(), node.syntax())?)?;
        Ok(Ir::Lambda(Rc::new(Lambda { param, body })))
    }
}

fn binary_op(kind: ast::BinOpKind) -> BinaryOp {
    match kind {
        ast::BinOpKind::Add => BinaryOp::Add,
        ast::BinOpKind::Sub => BinaryOp::Sub,
        ast::BinOpKind::Mul => BinaryOp::Mul,
        ast::BinOpKind::Div => BinaryOp::Div,
        ast::BinOpKind::Equal => BinaryOp::Equal,
        ast::BinOpKind::NotEqual => BinaryOp::NotEqual,
        ast::BinOpKind::Less => BinaryOp::Less,
        ast::BinOpKind::LessOrEq => BinaryOp::LessOrEq,
        ast::BinOpKind::More => BinaryOp::More,
        ast::BinOpKind::MoreOrEq => BinaryOp::MoreOrEq,
        ast::BinOpKind::And => BinaryOp::And,
        ast::BinOpKind::Or => BinaryOp::Or,
        ast::BinOpKind::Implication => BinaryOp::Implication,
        ast::BinOpKind::Concat => BinaryOp::Concat,
        ast::BinOpKind::Update => BinaryOp::Update,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn nested_attrpaths_are_merged() {
        let ir = compile("{ a.b = 1; a.c = 2; d = 3; }", "unit").unwrap();
        let Ir::Attrs { bindings, .. } = &*ir else {
            panic!("expected an attribute set, got {:?}", ir);
        };

        let names: Vec<&str> = bindings.entries.keys().map(SmolStr::as_str).collect();
        assert_eq!(names, vec!["a", "d"]);
        let Ir::Attrs { bindings: nested, .. } = &*bindings.entries["a"].value else {
            panic!("expected a nested set");
        };
        let names: Vec<&str> = nested.entries.keys().map(SmolStr::as_str).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[rstest]
    #[case::twice("{ a = 1; a = 2; }")]
    #[case::nested_over_value("{ a = 1; a.b = 2; }")]
    #[case::value_over_nested("{ a.b = 1; a = 2; }")]
    fn duplicate_attributes_are_rejected(#[case] code: &str) {
        let err = compile(code, "unit").unwrap_err();
        assert!(err.message.contains("already defined"), "{}", err);
    }

    #[test]
    fn let_bindings_need_static_names() {
        let err = compile("let k = \"x\"; in let ${k} = 1; in 2", "unit").unwrap_err();
        assert!(err.message.contains("not allowed in let"), "{}", err);
    }

    #[rstest]
    #[case::self_scope("./.", "_", 0)]
    #[case::child("./a/b", "_", 2)]
    #[case::parent("../a", "__", 1)]
    #[case::grandparent("../../a", "__", 2)]
    #[case::back_and_forth("./a/../b", "_", 1)]
    fn relative_paths_walk_the_tree(#[case] code: &str, #[case] base: &str, #[case] depth: usize) {
        let ir = compile(code, "unit").unwrap();
        match &*ir {
            Ir::Ident(name) => {
                assert_eq!(name, base);
                assert_eq!(depth, 0);
            }
            Ir::Select { target, path, .. } => {
                assert!(matches!(&**target, Ir::Ident(name) if name == base));
                assert_eq!(path.len(), depth);
            }
            other => panic!("unexpected lowering {:?}", other),
        }
    }

    #[test]
    fn absolute_paths_are_strings() {
        let ir = compile("/etc/hosts", "unit").unwrap();
        assert!(matches!(&*ir, Ir::Literal(Value::String(s)) if s == "/etc/hosts"));
    }

    #[test]
    fn search_paths_are_rejected() {
        let err = compile("<nixpkgs>", "unit").unwrap_err();
        assert!(err.message.contains("search paths"));
    }

    #[test]
    fn parse_errors_carry_a_location() {
        let err = compile("{\n  a = ;\n}", "broken").unwrap_err();
        assert_eq!(err.unit, "broken");
        assert_eq!(err.dialect, "nix");
        assert_eq!(err.location.map(|l| l.line), Some(2));
    }

    #[test]
    fn unexpected_end_points_at_the_end() {
        let err = compile("1 +", "unit").unwrap_err();
        assert_eq!(err.location.map(|l| l.line), Some(1));
        assert!(err.location.unwrap().column >= 3);
    }

    #[test]
    fn constant_strings_are_literals() {
        let ir = compile(r#""a${"b"}c""#, "unit").unwrap();
        assert!(matches!(&*ir, Ir::Literal(Value::String(s)) if s == "abc"));
    }
}
