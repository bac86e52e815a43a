//! The bytecode-offset-to-SSA-instruction mapping built while translating the legacy function
//! body into SSA form, kept live across the pass pipeline for DWARF emission.
//!
//! Forward lookups (`offset -> instruction`) drive breakpoint placement; the reverse direction
//! (`instruction -> offset`) is what a pass consults when it wants to know which source line an
//! instruction it is about to fold or eliminate came from.

use crate::container::Listener;
use crate::entities::Inst;
use std::collections::HashMap;

/// Tracks the correspondence between legacy-bytecode offsets and the SSA instructions they
/// lowered to, and keeps it correct as the pass pipeline rewrites the container.
#[derive(Default)]
pub struct DebugInfoMapping {
    offset_to_inst: HashMap<u32, Inst>,
    inst_to_offset: HashMap<Inst, u32>,
}

impl DebugInfoMapping {
    /// An empty mapping.
    pub fn new() -> Self {
        DebugInfoMapping::default()
    }

    /// Record that `offset` in the legacy bytecode body lowered to `inst`.
    pub fn record(&mut self, offset: u32, inst: Inst) {
        if let Some(old) = self.offset_to_inst.insert(offset, inst) {
            self.inst_to_offset.remove(&old);
        }
        self.inst_to_offset.insert(inst, offset);
    }

    /// The instruction `offset` lowered to, if the offset was recorded and its instruction has
    /// not since been dropped.
    pub fn lookup_offset(&self, offset: u32) -> Option<Inst> {
        self.offset_to_inst.get(&offset).copied()
    }

    /// The source offset `inst` traces back to, if any.
    pub fn lookup_instruction(&self, inst: Inst) -> Option<u32> {
        self.inst_to_offset.get(&inst).copied()
    }

    /// Transfer `old`'s offset (if any) to `new`. A pass that rewrites `old` into a new
    /// instruction (rather than mutating it in place) calls this before dropping `old`, so the
    /// source-location side-table keeps pointing at a live instruction.
    pub fn rebind(&mut self, old: Inst, new: Inst) {
        if let Some(offset) = self.inst_to_offset.remove(&old) {
            self.offset_to_inst.insert(offset, new);
            self.inst_to_offset.insert(new, offset);
        }
    }
}

impl Listener for DebugInfoMapping {
    fn instruction_removed(&mut self, inst: Inst) {
        if let Some(offset) = self.inst_to_offset.remove(&inst) {
            self.offset_to_inst.remove(&offset);
        }
    }
}
