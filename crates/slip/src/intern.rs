//! Symbol interning.
//!
//! Each parsed source unit carries its own symbol table mapping unsigned ids
//! to names. Only `Symbol` units dereference through it, and ids are never
//! meaningful across arenas: the import machinery re-interns every name it
//! copies into a parent context.

use ahash::AHashMap;

/// Id-to-name symbol table for one value graph.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    names: AHashMap<u64, String>,
    ids: AHashMap<String, u64>,
    next_id: u64,
}

impl SymbolTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            names: AHashMap::new(),
            ids: AHashMap::new(),
            next_id: 1,
        }
    }

    /// Returns the id for `name`, allocating one on first sight.
    pub fn intern(&mut self, name: &str) -> u64 {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.names.insert(id, name.to_owned());
        self.ids.insert(name.to_owned(), id);
        id
    }

    /// Looks a name up by id.
    #[must_use]
    pub fn name(&self, id: u64) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.names.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_reuses_ids() {
        let mut table = SymbolTable::new();
        let a = table.intern("alpha");
        let b = table.intern("beta");
        assert_ne!(a, b);
        assert_eq!(table.intern("alpha"), a);
        assert_eq!(table.name(a), Some("alpha"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn ids_start_positive() {
        let mut table = SymbolTable::new();
        assert_eq!(table.intern("x"), 1);
        assert!(!table.contains(0));
    }
}
