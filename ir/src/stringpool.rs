//! Interned strings shared across a module's identifiers, symbol references and string literals.

use ssacc_entity::{entity_impl, EntityRef};
use std::collections::HashMap;

/// A reference to an interned string. Compare by id; two equal [`StringId`]s always denote the
/// same text, and distinct ids may still denote equal text until the pool dedupes them (which it
/// always does on insertion, so in practice ids are also a canonical key).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringId(u32);
entity_impl!(StringId, "str");

/// A process-local intern table. Strings are immutable once interned; the pool only ever grows.
#[derive(Default)]
pub struct StringPool {
    strings: Vec<Box<str>>,
    index: HashMap<Box<str>, StringId>,
}

impl StringPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        StringPool::default()
    }

    /// Intern `text`, returning its stable id. Repeated interning of equal text returns the same
    /// id.
    pub fn intern(&mut self, text: &str) -> StringId {
        if let Some(&id) = self.index.get(text) {
            return id;
        }
        let id = StringId::new(self.strings.len());
        self.strings.push(text.into());
        self.index.insert(text.into(), id);
        id
    }

    /// Resolve an id back to its text. Panics on an id from a different pool; callers within this
    /// codebase never hold ids across pool boundaries.
    pub fn resolve(&self, id: StringId) -> &str {
        &self.strings[id.index()]
    }

    /// Number of distinct strings interned so far.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// `true` if no string has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedupes() {
        let mut pool = StringPool::new();
        let a = pool.intern("hello");
        let b = pool.intern("hello");
        let c = pool.intern("world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.resolve(a), "hello");
        assert_eq!(pool.len(), 2);
    }
}
