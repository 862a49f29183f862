//! Owned intermediate representation of nix dialect code.
//!
//! The syntax tree produced by rnix borrows into its green tree and
//! carries all the trivia of the source. Code is lowered once into this
//! representation when a unit is compiled, and the interpreter walks it
//! every time the unit is executed.

use std::collections::BTreeMap;
use std::rc::Rc;

use glagol_eval::Value;
use smol_str::SmolStr;

#[derive(Debug)]
pub(crate) enum Ir {
    Literal(Value),

    /// String with interpolated parts.
    Str(Vec<StrPart>),

    Ident(SmolStr),
    List(Vec<Rc<Ir>>),

    Attrs {
        recursive: bool,
        bindings: Bindings,
    },

    Let {
        bindings: Bindings,
        body: Rc<Ir>,
    },

    With {
        namespace: Rc<Ir>,
        body: Rc<Ir>,
    },

    If {
        condition: Rc<Ir>,
        then: Rc<Ir>,
        otherwise: Rc<Ir>,
    },

    Assert {
        condition: Rc<Ir>,
        body: Rc<Ir>,
    },

    Lambda(Rc<Lambda>),

    Apply {
        function: Rc<Ir>,
        argument: Rc<Ir>,
    },

    Select {
        target: Rc<Ir>,
        path: Vec<AttrKey>,
        default: Option<Rc<Ir>>,
    },

    HasAttr {
        target: Rc<Ir>,
        path: Vec<AttrKey>,
    },

    Unary {
        op: UnaryOp,
        operand: Rc<Ir>,
    },

    Binary {
        op: BinaryOp,
        lhs: Rc<Ir>,
        rhs: Rc<Ir>,
    },
}

#[derive(Debug)]
pub(crate) enum StrPart {
    Literal(String),
    Interpolation(Rc<Ir>),
}

/// Key of an attribute in a select or `?` expression.
#[derive(Debug)]
pub(crate) enum AttrKey {
    Static(SmolStr),
    Dynamic(Rc<Ir>),
}

#[derive(Debug)]
pub(crate) struct Binding {
    pub value: Rc<Ir>,

    /// Evaluate the value in the scope surrounding the binding set,
    /// even if the set is recursive. This is how a plain `inherit`
    /// works.
    pub outer: bool,
}

/// Bindings of an attribute set or `let` expression. Nested attribute
/// paths (`a.b = 1; a.c = 2;`) are already merged into nested sets.
#[derive(Debug, Default)]
pub(crate) struct Bindings {
    pub entries: BTreeMap<SmolStr, Binding>,

    /// Bindings with a computed name, e.g. `${name} = value;`. These
    /// are not visible in the recursive scope.
    pub dynamic: Vec<(Rc<Ir>, Rc<Ir>)>,
}

#[derive(Debug)]
pub(crate) struct Lambda {
    pub param: Param,
    pub body: Rc<Ir>,
}

#[derive(Debug)]
pub(crate) enum Param {
    Ident(SmolStr),

    /// `{ a, b ? 1, ... } @ args`
    Pattern {
        entries: Vec<(SmolStr, Option<Rc<Ir>>)>,
        ellipsis: bool,
        bind: Option<SmolStr>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Negate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Equal,
    NotEqual,
    Less,
    LessOrEq,
    More,
    MoreOrEq,
    And,
    Or,
    Implication,
    Concat,
    Update,
}
