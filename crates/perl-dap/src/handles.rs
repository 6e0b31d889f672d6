//! Variable-reference handles.
//!
//! A handle is the opaque integer the client hands back to expand a scope
//! or a nested value. Handles are a tagged union rather than an arithmetic
//! encoding, minted monotonically, and live only while the debuggee is
//! stopped: any resume clears the store, and a stale id dereferences to
//! nothing rather than an error.

use std::collections::HashMap;

use perl_dbg::parse::ValueKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestedKind {
    Scalar,
    Array,
    Hash,
}

impl NestedKind {
    pub fn from_value_kind(kind: ValueKind) -> Option<Self> {
        match kind {
            ValueKind::Hash => Some(NestedKind::Hash),
            ValueKind::Array => Some(NestedKind::Array),
            ValueKind::Scalar => Some(NestedKind::Scalar),
            ValueKind::Leaf => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableHandle {
    Locals,
    Globals,
    Nested { kind: NestedKind, raw: String },
}

#[derive(Debug, Default)]
pub struct HandleStore {
    next: i64,
    entries: HashMap<i64, VariableHandle>,
}

impl HandleStore {
    pub fn mint(&mut self, handle: VariableHandle) -> i64 {
        self.next += 1;
        self.entries.insert(self.next, handle);
        self.next
    }

    pub fn get(&self, id: i64) -> Option<&VariableHandle> {
        self.entries.get(&id)
    }

    /// Invalidate everything; ids keep climbing so a stale client id can
    /// never alias a fresh handle.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_minted_monotonically() {
        let mut store = HandleStore::default();
        let a = store.mint(VariableHandle::Locals);
        let b = store.mint(VariableHandle::Globals);
        assert!(b > a);
        assert_eq!(store.get(a), Some(&VariableHandle::Locals));
    }

    #[test]
    fn clear_invalidates_but_never_reuses_ids() {
        let mut store = HandleStore::default();
        let a = store.mint(VariableHandle::Locals);
        store.clear();
        assert!(store.get(a).is_none());
        let b = store.mint(VariableHandle::Globals);
        assert!(b > a);
    }

    #[test]
    fn nested_kind_maps_container_values_only() {
        assert_eq!(
            NestedKind::from_value_kind(ValueKind::Hash),
            Some(NestedKind::Hash)
        );
        assert_eq!(NestedKind::from_value_kind(ValueKind::Leaf), None);
    }
}
