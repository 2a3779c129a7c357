//! Lexical scoping and the lambda table.
//!
//! Both the type checker and the interpreter maintain a stack of name→record
//! frames with identical discipline; [`ScopeStack`] is generic over the
//! record so the checker stores type information while the interpreter stores
//! values.
//!
//! Lambda lifetimes are bounded by the scope that registered them: popping a
//! frame removes every lambda registered at or above the popped depth, so no
//! lambda id outlives the frame it was defined in.

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{arena::Kind, value::Value};

/// A stack of name→record frames with top-down lookup.
#[derive(Debug, Default)]
pub struct ScopeStack<T> {
    frames: Vec<AHashMap<String, T>>,
}

impl<T> ScopeStack<T> {
    #[must_use]
    pub fn new() -> Self {
        Self { frames: Vec::new() }
    }

    /// Number of live frames.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self) {
        self.frames.push(AHashMap::new());
    }

    /// Pops the topmost frame. False when there is nothing to pop.
    pub fn pop(&mut self) -> bool {
        self.frames.pop().is_some()
    }

    /// True when `name` resolves; `local_only` searches the topmost frame
    /// only.
    #[must_use]
    pub fn has(&self, name: &str, local_only: bool) -> bool {
        if local_only {
            return self
                .frames
                .last()
                .is_some_and(|frame| frame.contains_key(name));
        }
        self.frames.iter().rev().any(|frame| frame.contains_key(name))
    }

    /// Binds `name` in the topmost frame, shadowing any enclosing binding.
    /// False only when no frame exists.
    pub fn define(&mut self, name: &str, record: T) -> bool {
        match self.frames.last_mut() {
            Some(frame) => {
                frame.insert(name.to_owned(), record);
                true
            }
            None => false,
        }
    }

    /// Walks frames from the top down.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&T> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }
}

/// One declared parameter of a lambda.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub kind: Kind,
}

/// A registered lambda: parameters, declared return kind, the body value, and
/// the scope depth it was registered at.
#[derive(Debug, Clone)]
pub struct LambdaDef {
    pub params: SmallVec<[Param; 4]>,
    pub return_kind: Kind,
    pub body: Value,
    pub depth: usize,
}

/// Arena of lambda bodies keyed by monotonically allocated id.
///
/// Ids are positive and never reused within one run.
#[derive(Debug)]
pub struct LambdaStore {
    defs: AHashMap<u64, LambdaDef>,
    next_id: u64,
}

impl LambdaStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            defs: AHashMap::new(),
            next_id: 1,
        }
    }

    /// Returns a fresh id.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn register(&mut self, id: u64, def: LambdaDef) {
        self.defs.insert(id, def);
    }

    #[must_use]
    pub fn get(&self, id: u64) -> Option<&LambdaDef> {
        self.defs.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.defs.contains_key(&id)
    }

    /// Drops every lambda registered at or above `depth`. Called when the
    /// frame at `depth` pops.
    pub fn purge_at_or_above(&mut self, depth: usize) {
        self.defs.retain(|_, def| def.depth < depth);
    }
}
