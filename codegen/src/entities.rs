//! Entity references for the virtual-assembly layer: virtual registers and asmcmp instructions.

use ssacc_entity::entity_impl;

/// A virtual register in an asmcmp context. Distinct from [`ssacc_optimizer::Value`]: one SSA
/// value can need more than one vreg (e.g. a value split across an integer and a flags result),
/// and a vreg can carry no SSA provenance at all (scratch registers the lowering pattern needs).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(u32);
entity_impl!(VReg, "vreg");

/// A reference to one virtual instruction in an asmcmp context's doubly-linked list. Stable
/// across reordering: a source-map range or a devirtualization rewrite names the instruction by
/// this id, never by its position in the list.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AsmInst(u32);
entity_impl!(AsmInst, "asm-inst");

/// A label marking a jump target in the asmcmp list (a block entry, or a trampoline landing pad
/// synthesised for `asm goto`).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(u32);
entity_impl!(Label, "label");

/// An index into the frame's spill area, one eightbyte wide.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpillSlot(u32);
entity_impl!(SpillSlot, "spill-slot");
