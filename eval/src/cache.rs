//! Three-slot memoisation of a unit's source text, compiled form and
//! value.
//!
//! Each slot is computed on first read from the slot before it and
//! then kept until it is invalidated. Writing or invalidating a slot
//! also invalidates all slots derived from it. Failed computations are
//! not cached: the next read retries.

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::Compiled;
use crate::errors::{ErrorKind, EvalResult};
use crate::value::Value;

/// Names the slots of a [`CacheCell`], in dependency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Slot {
    Source,
    Compiled,
    Value,
}

/// The computations that fill the slots of a [`CacheCell`].
pub trait Stages {
    /// Name of the unit, used for error reporting.
    fn unit(&self) -> &str;

    /// Produce the source text. `None` means the unit has no source.
    fn load(&self) -> EvalResult<Option<Rc<str>>>;

    fn compile(&self, source: &str) -> EvalResult<Compiled>;

    fn execute(&self, compiled: &Compiled) -> EvalResult<Value>;
}

#[derive(Debug)]
enum State<T> {
    Unset,
    // the slot is being computed, reading it now is a cycle
    Pending,
    Set(T),
}

#[derive(Debug)]
struct Memo<T> {
    state: RefCell<State<T>>,
}

impl<T: Clone> Memo<T> {
    fn new() -> Self {
        Memo {
            state: RefCell::new(State::Unset),
        }
    }

    fn with(value: T) -> Self {
        Memo {
            state: RefCell::new(State::Set(value)),
        }
    }

    fn get_or_try<F>(&self, unit: &str, compute: F) -> EvalResult<T>
    where
        F: FnOnce() -> EvalResult<T>,
    {
        match &*self.state.borrow() {
            State::Set(value) => return Ok(value.clone()),
            State::Pending => return Err(ErrorKind::Cycle { unit: unit.into() }),
            State::Unset => {}
        }

        *self.state.borrow_mut() = State::Pending;
        let result = compute();

        // If the slot was written or invalidated while the computation
        // ran, the result is handed to this reader but not stored.
        let mut state = self.state.borrow_mut();
        match result {
            Ok(value) => {
                if matches!(*state, State::Pending) {
                    *state = State::Set(value.clone());
                }
                Ok(value)
            }
            Err(err) => {
                if matches!(*state, State::Pending) {
                    *state = State::Unset;
                }
                Err(err)
            }
        }
    }

    fn set(&self, value: T) {
        *self.state.borrow_mut() = State::Set(value);
    }

    fn clear(&self) {
        *self.state.borrow_mut() = State::Unset;
    }

    fn is_set(&self) -> bool {
        matches!(*self.state.borrow(), State::Set(_))
    }
}

pub struct CacheCell {
    source: Memo<Option<Rc<str>>>,
    compiled: Memo<Option<Compiled>>,
    value: Memo<Option<Value>>,
}

impl Default for CacheCell {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheCell {
    pub fn new() -> Self {
        CacheCell {
            source: Memo::new(),
            compiled: Memo::new(),
            value: Memo::new(),
        }
    }

    /// Create a cell whose source slot is already filled.
    pub fn with_source(source: Option<Rc<str>>) -> Self {
        CacheCell {
            source: Memo::with(source),
            compiled: Memo::new(),
            value: Memo::new(),
        }
    }

    pub fn source<S: Stages + ?Sized>(&self, stages: &S) -> EvalResult<Option<Rc<str>>> {
        self.source.get_or_try(stages.unit(), || stages.load())
    }

    pub fn compiled<S: Stages + ?Sized>(&self, stages: &S) -> EvalResult<Option<Compiled>> {
        self.compiled.get_or_try(stages.unit(), || {
            match self.source(stages)? {
                Some(source) => stages.compile(&source).map(Some),
                None => Ok(None),
            }
        })
    }

    pub fn value<S: Stages + ?Sized>(&self, stages: &S) -> EvalResult<Option<Value>> {
        self.value.get_or_try(stages.unit(), || {
            match self.compiled(stages)? {
                Some(compiled) => stages.execute(&compiled).map(Some),
                None => Ok(None),
            }
        })
    }

    pub fn set_source(&self, source: Option<Rc<str>>) {
        self.source.set(source);
        self.invalidate(Slot::Compiled);
    }

    pub fn set_compiled(&self, compiled: Option<Compiled>) {
        self.compiled.set(compiled);
        self.invalidate(Slot::Value);
    }

    pub fn set_value(&self, value: Option<Value>) {
        self.value.set(value);
    }

    /// Invalidate `slot` and every slot derived from it.
    pub fn invalidate(&self, slot: Slot) {
        if slot <= Slot::Source {
            self.source.clear();
        }
        if slot <= Slot::Compiled {
            self.compiled.clear();
        }
        self.value.clear();
    }

    pub fn is_cached(&self, slot: Slot) -> bool {
        match slot {
            Slot::Source => self.source.is_set(),
            Slot::Compiled => self.compiled.is_set(),
            Slot::Value => self.value.is_set(),
        }
    }
}

impl std::fmt::Debug for CacheCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCell")
            .field("source", &self.is_cached(Slot::Source))
            .field("compiled", &self.is_cached(Slot::Compiled))
            .field("value", &self.is_cached(Slot::Value))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Stages that count how often each of them ran. The source text
    /// is a number, "compiling" parses it and "executing" doubles it.
    #[derive(Default)]
    struct Counting {
        source: RefCell<Option<String>>,
        loads: Cell<usize>,
        compiles: Cell<usize>,
        executions: Cell<usize>,
        reentrant: Option<Rc<CacheCell>>,
    }

    impl Stages for Counting {
        fn unit(&self) -> &str {
            "counting"
        }

        fn load(&self) -> EvalResult<Option<Rc<str>>> {
            self.loads.set(self.loads.get() + 1);
            Ok(self.source.borrow().as_deref().map(Rc::from))
        }

        fn compile(&self, source: &str) -> EvalResult<Compiled> {
            self.compiles.set(self.compiles.get() + 1);
            let number: i64 = source
                .trim()
                .parse()
                .map_err(|_| ErrorKind::Throw(format!("not a number: {}", source)))?;
            Ok(Compiled::new("counting", number))
        }

        fn execute(&self, compiled: &Compiled) -> EvalResult<Value> {
            self.executions.set(self.executions.get() + 1);
            if let Some(cell) = &self.reentrant {
                cell.value(self)?;
            }
            let number = compiled
                .downcast_ref::<i64>()
                .ok_or(ErrorKind::AssertionFailed)?;
            Ok(Value::Integer(number * 2))
        }
    }

    fn counting(source: &str) -> Counting {
        Counting {
            source: RefCell::new(Some(source.to_owned())),
            ..Default::default()
        }
    }

    #[test]
    fn slots_are_computed_once() {
        let stages = counting("21");
        let cell = CacheCell::new();

        assert_eq!(cell.value(&stages).unwrap().unwrap().as_int().unwrap(), 42);
        assert_eq!(cell.value(&stages).unwrap().unwrap().as_int().unwrap(), 42);

        assert_eq!(stages.loads.get(), 1);
        assert_eq!(stages.compiles.get(), 1);
        assert_eq!(stages.executions.get(), 1);
    }

    #[test]
    fn missing_source_yields_absent_value() {
        let stages = Counting::default();
        let cell = CacheCell::new();

        assert!(cell.value(&stages).unwrap().is_none());
        assert!(cell.is_cached(Slot::Value));
        assert_eq!(stages.compiles.get(), 0);
    }

    #[test]
    fn writing_source_invalidates_derived_slots() {
        let stages = counting("1");
        let cell = CacheCell::new();
        cell.value(&stages).unwrap();

        cell.set_source(Some("5".into()));
        assert!(cell.is_cached(Slot::Source));
        assert!(!cell.is_cached(Slot::Compiled));
        assert!(!cell.is_cached(Slot::Value));

        assert_eq!(cell.value(&stages).unwrap().unwrap().as_int().unwrap(), 10);
        // the written source is used, nothing is reloaded
        assert_eq!(stages.loads.get(), 1);
    }

    #[test]
    fn invalidating_compiled_keeps_source() {
        let stages = counting("1");
        let cell = CacheCell::new();
        cell.value(&stages).unwrap();

        cell.invalidate(Slot::Compiled);
        assert!(cell.is_cached(Slot::Source));
        assert!(!cell.is_cached(Slot::Value));

        cell.value(&stages).unwrap();
        assert_eq!(stages.loads.get(), 1);
        assert_eq!(stages.compiles.get(), 2);
    }

    #[test]
    fn written_value_is_returned_verbatim() {
        let stages = counting("1");
        let cell = CacheCell::new();
        cell.set_value(Some(Value::from("pinned")));

        assert_eq!(cell.value(&stages).unwrap().unwrap().to_str().unwrap(), "pinned");
        assert_eq!(stages.loads.get(), 0);
    }

    #[test]
    fn failures_are_not_cached() {
        let stages = counting("nope");
        let cell = CacheCell::new();

        assert!(matches!(cell.value(&stages), Err(ErrorKind::Throw(_))));
        assert!(!cell.is_cached(Slot::Compiled));
        assert!(!cell.is_cached(Slot::Value));

        stages.source.replace(Some("3".into()));
        cell.invalidate(Slot::Source);
        assert_eq!(cell.value(&stages).unwrap().unwrap().as_int().unwrap(), 6);
    }

    #[test]
    fn reentrant_reads_are_cycles() {
        let cell = Rc::new(CacheCell::new());
        let stages = Counting {
            reentrant: Some(cell.clone()),
            ..counting("1")
        };

        assert!(matches!(
            cell.value(&stages),
            Err(ErrorKind::Cycle { unit }) if unit == "counting"
        ));

        // the slot is usable again after the failure
        assert!(!cell.is_cached(Slot::Value));
    }
}
