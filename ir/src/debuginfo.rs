//! The debug-info side-table: a tree of scoped entries with attribute bags, consumed by DWARF
//! emission hooks in the codegen driver.

use crate::stringpool::StringId;
use ssacc_entity::{entity_impl, EntityRef};
use std::collections::BTreeMap;

/// A reference to a [`DebugEntry`] owned by a [`DebugInfo`] table.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DebugEntryId(u32);
entity_impl!(DebugEntryId, "dbg");

/// The scope kind a [`DebugEntry`] describes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DebugEntryKind {
    /// The compilation-unit root.
    CompileUnit,
    /// A function scope.
    Function,
    /// A lexical block nested inside a function.
    LexicalBlock,
    /// A global variable.
    GlobalVariable,
    /// A local variable or parameter.
    LocalVariable,
    /// A named type.
    TypeName,
}

/// One DWARF-oriented attribute. Kept as a small closed set rather than a generic key/value bag
/// so the emitter can pattern-match without a string comparison per attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum DebugAttribute {
    /// The entry's source-level name.
    Name(StringId),
    /// Source file, 1-based line, 1-based column.
    SourceLocation(StringId, u32, u32),
    /// Byte offset of a member or local within its parent.
    ByteOffset(u64),
    /// A reference to the describing type's debug entry.
    TypeRef(DebugEntryId),
    /// The mangled/link-time symbol name, for functions and global variables.
    LinkageName(StringId),
}

/// One node of the debug-info tree.
pub struct DebugEntry {
    kind: DebugEntryKind,
    parent: Option<DebugEntryId>,
    children: Vec<DebugEntryId>,
    attributes: Vec<DebugAttribute>,
}

impl DebugEntry {
    /// The scope kind.
    pub fn kind(&self) -> DebugEntryKind {
        self.kind
    }

    /// This entry's parent, or `None` at the compile-unit root.
    pub fn parent(&self) -> Option<DebugEntryId> {
        self.parent
    }

    /// Child entries, in insertion order.
    pub fn children(&self) -> &[DebugEntryId] {
        &self.children
    }

    /// Attributes attached to this entry, in insertion order.
    pub fn attributes(&self) -> &[DebugAttribute] {
        &self.attributes
    }
}

/// The module-wide debug-info tree plus the reverse mapping from SSA instruction ids (recorded as
/// raw `u32`s here to avoid a dependency on `ssacc-optimizer`) to the debug entry describing the
/// enclosing lexical scope at that point.
#[derive(Default)]
pub struct DebugInfo {
    entries: Vec<DebugEntry>,
    root: Option<DebugEntryId>,
    instruction_scope: BTreeMap<u32, DebugEntryId>,
}

impl DebugInfo {
    /// An empty debug-info table.
    pub fn new() -> Self {
        DebugInfo::default()
    }

    /// Create the compile-unit root. Must be called at most once per table.
    pub fn set_root(&mut self, attributes: Vec<DebugAttribute>) -> DebugEntryId {
        debug_assert!(self.root.is_none(), "debug-info root already set");
        let id = self.push_entry(DebugEntryKind::CompileUnit, None, attributes);
        self.root = Some(id);
        id
    }

    /// The compile-unit root, if set.
    pub fn root(&self) -> Option<DebugEntryId> {
        self.root
    }

    /// Add a child entry under `parent`.
    pub fn add_entry(
        &mut self,
        parent: DebugEntryId,
        kind: DebugEntryKind,
        attributes: Vec<DebugAttribute>,
    ) -> DebugEntryId {
        let id = self.push_entry(kind, Some(parent), attributes);
        self.entries[parent.index()].children.push(id);
        id
    }

    fn push_entry(
        &mut self,
        kind: DebugEntryKind,
        parent: Option<DebugEntryId>,
        attributes: Vec<DebugAttribute>,
    ) -> DebugEntryId {
        let id = DebugEntryId::new(self.entries.len());
        self.entries.push(DebugEntry {
            kind,
            parent,
            children: Vec::new(),
            attributes,
        });
        id
    }

    /// Look up an entry by id.
    pub fn entry(&self, id: DebugEntryId) -> &DebugEntry {
        &self.entries[id.index()]
    }

    /// Record that the legacy-bytecode or SSA instruction numbered `instruction_id` lies within
    /// `scope`. Rewritten by the optimizer's debug-info listener whenever the owning instruction
    /// is replaced.
    pub fn set_instruction_scope(&mut self, instruction_id: u32, scope: DebugEntryId) {
        self.instruction_scope.insert(instruction_id, scope);
    }

    /// Remove a previously recorded instruction-to-scope mapping.
    pub fn clear_instruction_scope(&mut self, instruction_id: u32) {
        self.instruction_scope.remove(&instruction_id);
    }

    /// The scope recorded for `instruction_id`, if any.
    pub fn instruction_scope(&self, instruction_id: u32) -> Option<DebugEntryId> {
        self.instruction_scope.get(&instruction_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_links_children_to_their_parent() {
        let mut info = DebugInfo::new();
        let root = info.set_root(vec![]);
        let func = info.add_entry(root, DebugEntryKind::Function, vec![]);
        assert_eq!(info.entry(root).children(), &[func]);
        assert_eq!(info.entry(func).parent(), Some(root));
    }

    #[test]
    fn instruction_scope_rewrite_on_replace() {
        let mut info = DebugInfo::new();
        let root = info.set_root(vec![]);
        let func = info.add_entry(root, DebugEntryKind::Function, vec![]);
        info.set_instruction_scope(7, func);
        assert_eq!(info.instruction_scope(7), Some(func));
        info.clear_instruction_scope(7);
        info.set_instruction_scope(8, func);
        assert_eq!(info.instruction_scope(7), None);
        assert_eq!(info.instruction_scope(8), Some(func));
    }
}
