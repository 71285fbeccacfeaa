//! String interning for grammar and corpus symbols.
//!
//! Terminals and nonterminals share one identifier space: a `Symbol` is a
//! dense `u32` handed out in insertion order. All hot-path comparisons in the
//! grammar and the inside-outside recursions are `u32` comparisons; strings
//! only reappear at the I/O boundary.

use rustc_hash::FxHashMap;
use std::fmt;

/// Interned symbol identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Two-way table between external strings and `Symbol` ids.
///
/// Ids are assigned in insertion order starting at 0. The table lives for the
/// whole run; it is not thread-safe (the trainer is single-threaded).
#[derive(Debug, Default)]
pub struct Signature {
    str_to_id: FxHashMap<Box<str>, Symbol>,
    id_to_str: Vec<Box<str>>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string, returning its unique id. Idempotent.
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&id) = self.str_to_id.get(s) {
            return id;
        }

        let id = Symbol(self.id_to_str.len() as u32);
        let boxed: Box<str> = s.into();
        self.str_to_id.insert(boxed.clone(), id);
        self.id_to_str.push(boxed);
        id
    }

    /// Look up a string without interning it.
    pub fn lookup(&self, s: &str) -> Option<Symbol> {
        self.str_to_id.get(s).copied()
    }

    /// Resolve an id back to its string, or `""` if the id is out of range.
    pub fn resolve_id(&self, id: Symbol) -> &str {
        self.id_to_str.get(id.index()).map_or("", |s| s.as_ref())
    }

    /// Whether the id has been assigned.
    pub fn contains_id(&self, id: Symbol) -> bool {
        id.index() < self.id_to_str.len()
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.id_to_str.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_str.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "id\t| symbol")?;
        writeln!(f, "----------------")?;
        for (i, s) in self.id_to_str.iter().enumerate() {
            writeln!(f, "{}\t| {}", i, s)?;
        }
        Ok(())
    }
}
