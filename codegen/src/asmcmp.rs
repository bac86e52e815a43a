//! The virtual-assembly intermediate form: a doubly-linked list of tagged `(opcode, arg0, arg1)`
//! virtual instructions operating on virtual registers, plus the side tables (source map,
//! register table) that travel with it through the pipeline.
//!
//! Instruction identity is independent of list position (see [`AsmInst`]): passes splice,
//! reorder and delete nodes in the linked list, but the source map and any earlier pass's saved
//! instruction ids keep referring to the same instruction.

use crate::entities::{AsmInst, Label, SpillSlot, VReg};
use ssacc_ir::error::{self, Result};
use ssacc_entity::{PrimaryMap, SecondaryMap};
use std::collections::HashMap;

/// The register class a vreg is constrained to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegClass {
    /// A general-purpose integer register.
    GeneralPurpose,
    /// An SSE/AVX vector register (floats and doubles both route through xmm).
    Sse,
    /// The x87 floating-point stack.
    X87,
    /// A single condition-code bit (the result of a compare, consumed by a conditional jump or
    /// `setcc` before it is ever spilled — flags cannot be saved to memory directly).
    FlagBit,
    /// Not a real register class: this vreg is pinned to a memory location in the frame's
    /// indirect-spill area (used for values too large for one register, e.g. long double).
    IndirectSpillSlot,
}

/// Where the allocator would like to put a vreg, before it has actually run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Hint {
    /// No preference.
    None,
    /// Prefer a physical register.
    PreferPhysical,
    /// Prefer the spill area directly (the value is rarely read, e.g. a debug-only local).
    PreferSpillArea,
    /// Only ever lives in memory; never allocate a physical register for it.
    MemoryOnly,
}

/// A physical AMD64 register, named by class and a small ordinal matching the System V argument
/// register numbering where applicable (see `ssacc_abi::classify::Placement`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhysReg {
    /// Which register file this name is in.
    pub class: RegClass,
    /// `0..16` for general-purpose (rax=0 .. r15=15, in the conventional x86-64 encoding order)
    /// and for SSE (xmm0..xmm15).
    pub encoding: u8,
}

impl PhysReg {
    /// Construct a general-purpose physical register.
    pub fn gpr(encoding: u8) -> Self {
        PhysReg { class: RegClass::GeneralPurpose, encoding }
    }

    /// Construct an SSE physical register.
    pub fn xmm(encoding: u8) -> Self {
        PhysReg { class: RegClass::Sse, encoding }
    }

    /// Conventional AT&T/Intel register name for this encoding, at 64-bit width for GPRs.
    pub fn name(self) -> &'static str {
        match self.class {
            RegClass::GeneralPurpose => GPR_NAMES[self.encoding as usize],
            RegClass::Sse => XMM_NAMES[self.encoding as usize],
            RegClass::X87 => "st(0)",
            RegClass::FlagBit => "flags",
            RegClass::IndirectSpillSlot => "(spill)",
        }
    }
}

const GPR_NAMES: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12", "r13",
    "r14", "r15",
];
const XMM_NAMES: [&str; 16] = [
    "xmm0", "xmm1", "xmm2", "xmm3", "xmm4", "xmm5", "xmm6", "xmm7", "xmm8", "xmm9", "xmm10",
    "xmm11", "xmm12", "xmm13", "xmm14", "xmm15",
];

/// Once the allocator runs, where a vreg actually landed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Assignment {
    /// Not yet assigned.
    Unassigned,
    /// A concrete physical register.
    Physical(PhysReg),
    /// A slot in the frame's spill area.
    Spill(SpillSlot),
}

/// Per-vreg bookkeeping: declared class, the allocator's hint, and (post-allocation) its
/// assignment.
#[derive(Clone, Debug)]
pub struct VRegData {
    /// The register file this vreg must land in.
    pub class: RegClass,
    /// The allocator's placement preference.
    pub hint: Hint,
    /// Where it ended up, or `Unassigned` before regalloc runs.
    pub assignment: Assignment,
}

/// A memory operand's base/index register, before or after allocation has resolved it to a
/// concrete physical register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RegRef {
    /// Not yet allocated.
    Virtual(VReg),
    /// Resolved by devirtualization.
    Physical(PhysReg),
}

/// A memory reference: `[base + index*scale + disp]`, optionally through a segment override (used
/// for thread-local accesses via `%fs`/`%gs`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MemOperand {
    /// Base register, if any.
    pub base: Option<RegRef>,
    /// Index register, if any.
    pub index: Option<RegRef>,
    /// Index scale; one of 1, 2, 4, 8.
    pub scale: u8,
    /// Constant displacement added to the computed address.
    pub disp: i32,
    /// `%fs`/`%gs` segment override, if any.
    pub segment: Option<Segment>,
}

/// A segment-register override on a memory operand.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    /// `%fs`, used by the TLS model on this platform.
    Fs,
    /// `%gs`.
    Gs,
}

/// One operand slot of a virtual instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    /// No operand.
    None,
    /// A physical register, already concrete (used for ABI-mandated fixed registers like the
    /// return-value register before allocation ever touches it).
    Physical(PhysReg),
    /// A virtual register.
    Virtual(VReg),
    /// An immediate integer.
    ImmInt(i64),
    /// A symbol reference plus byte offset (`symbol+offset`).
    ImmSymbol(ssacc_ir::StringId, i64),
    /// A branch target.
    ImmLabel(Label),
    /// A memory operand.
    Memory(MemOperand),
}

/// The opcode of a virtual instruction. A small, closed set at the asmcmp layer — one entry per
/// distinct AMD64 instruction-selection pattern the lowering stage can emit, not one per SSA
/// opcode (several SSA opcodes share a pattern, e.g. every integer comparison lowers to `cmp` plus
/// a `setcc` variant named in `arg1`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AsmOp {
    /// Define a block-entry label. `arg0` is the label.
    Label,
    /// `mov arg0, arg1` (dst, src).
    Mov,
    /// `lea arg0, arg1` where `arg1` is a `Memory` operand computing an address, not a load.
    Lea,
    /// Integer add; two-address form is legalised by the devirtualizer.
    Add,
    /// Integer subtract.
    Sub,
    /// Integer signed multiply.
    IMul,
    /// Integer signed divide (implicit rdx:rax dividend, quotient in rax, remainder in rdx).
    IDiv,
    /// Integer unsigned divide.
    Div,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Two's-complement negate. `arg0` only.
    Neg,
    /// Bitwise complement. `arg0` only.
    Not,
    /// Logical shift left.
    Shl,
    /// Logical shift right.
    Shr,
    /// Arithmetic shift right.
    Sar,
    /// `cmp arg0, arg1`; result lives in flags.
    Cmp,
    /// `test arg0, arg1`.
    Test,
    /// `setcc arg1, arg0`: sets the byte register in `arg0` to the flags condition named by
    /// `arg1` (`ImmInt` holding a `CmpOp` discriminant).
    SetCc,
    /// `jmp arg0`.
    Jmp,
    /// Conditional jump; `arg0` is the target, `arg1` the `CmpOp` condition.
    Jcc,
    /// `call arg0`.
    Call,
    /// `ret`.
    Ret,
    /// SSE scalar move (`movsd`/`movss`, width carried by the vreg's declared class size — this
    /// form does not need a width tag since long-double and complex types never route through
    /// this opcode).
    MovSse,
    /// SSE scalar add.
    AddSse,
    /// SSE scalar subtract.
    SubSse,
    /// SSE scalar multiply.
    MulSse,
    /// SSE scalar divide.
    DivSse,
    /// SSE scalar compare (sets flags via `comiss`/`comisd`).
    CmpSse,
    /// Push a value onto the real machine stack (prologue/epilogue and call-argument staging).
    Push,
    /// Pop the real machine stack.
    Pop,
    /// An opaque instruction (inline assembly's expanded template, or a runtime-helper call whose
    /// def/use set the devirtualizer must take on faith rather than infer structurally).
    Opaque,
    /// No-op retained only so a source-map range has something to point at (e.g. a dropped
    /// debug marker).
    Nop,
}

struct Node {
    opcode: AsmOp,
    arg0: Arg,
    arg1: Arg,
    prev: Option<AsmInst>,
    next: Option<AsmInst>,
    removed: bool,
}

/// One `[begin, end)` span over asmcmp-instruction program order, each associated with a source
/// location. Ranges are sorted and pairwise disjoint; see [`SourceMap::insert`].
#[derive(Clone, Debug)]
struct SourceMapEntry {
    begin: u32,
    end: u32,
    file: ssacc_ir::StringId,
    line: u32,
    column: u32,
}

/// Maps a range of asmcmp program-order positions to `(file, line, column)`. Program order here
/// is the index an instruction held the moment the range was recorded, which is why insertion
/// rejects overlap eagerly rather than trying to stay consistent under arbitrary reordering —
/// callers build the source map once, during lowering, before any pass reorders instructions.
#[derive(Default, Clone)]
pub struct SourceMap {
    entries: Vec<SourceMapEntry>,
}

impl SourceMap {
    /// An empty source map.
    pub fn new() -> Self {
        SourceMap::default()
    }

    /// Record that positions `[begin, end)` originate from `(file, line, column)`. Fails with
    /// `already-exists` if the range overlaps one already recorded.
    pub fn insert(&mut self, begin: u32, end: u32, file: ssacc_ir::StringId, line: u32, column: u32) -> Result<()> {
        if begin >= end {
            return Err(error::invalid_parameter("source map range must be non-empty"));
        }
        if self.entries.iter().any(|e| begin < e.end && e.begin < end) {
            return Err(error::already_exists("source map range overlaps an existing entry"));
        }
        let index = self.entries.partition_point(|e| e.begin < begin);
        self.entries.insert(index, SourceMapEntry { begin, end, file, line, column });
        Ok(())
    }

    /// The `(file, line, column)` of the entry containing `position`, if any.
    pub fn lookup(&self, position: u32) -> Option<(ssacc_ir::StringId, u32, u32)> {
        let index = self.entries.partition_point(|e| e.end <= position);
        self.entries
            .get(index)
            .filter(|e| e.begin <= position && position < e.end)
            .map(|e| (e.file, e.line, e.column))
    }
}

/// The virtual-assembly context for one function: the instruction list, the vreg table, and the
/// source map. Built by the lowering stage, rewritten in place by every later pipeline stage.
pub struct AsmContext {
    nodes: PrimaryMap<AsmInst, Node>,
    head: Option<AsmInst>,
    tail: Option<AsmInst>,
    vregs: PrimaryMap<VReg, VRegData>,
    labels: PrimaryMap<Label, Option<AsmInst>>,
    label_lookup: HashMap<usize, Label>,
    pub source_map: SourceMap,
    next_label_key: usize,
    /// Def/use sets recorded for opaque instructions (inline asm, runtime-helper calls) at
    /// construction time, since the devirtualizer cannot infer them structurally from `arg0`/`arg1`
    /// alone.
    opaque_operands: SecondaryMap<AsmInst, Vec<VReg>>,
}

impl AsmContext {
    /// An empty context.
    pub fn new() -> Self {
        AsmContext {
            nodes: PrimaryMap::new(),
            head: None,
            tail: None,
            vregs: PrimaryMap::new(),
            labels: PrimaryMap::new(),
            label_lookup: HashMap::new(),
            source_map: SourceMap::new(),
            next_label_key: 0,
            opaque_operands: SecondaryMap::new(),
        }
    }

    /// Allocate a fresh virtual register of the given class.
    pub fn new_vreg(&mut self, class: RegClass, hint: Hint) -> VReg {
        self.vregs.push(VRegData { class, hint, assignment: Assignment::Unassigned })
    }

    /// This vreg's bookkeeping.
    pub fn vreg(&self, vreg: VReg) -> &VRegData {
        &self.vregs[vreg]
    }

    /// Mutable access, used by the register allocator to write assignments.
    pub fn vreg_mut(&mut self, vreg: VReg) -> &mut VRegData {
        &mut self.vregs[vreg]
    }

    /// Every vreg allocated in this context, in allocation order.
    pub fn vregs(&self) -> impl Iterator<Item = VReg> + '_ {
        self.vregs.keys()
    }

    /// Allocate a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        let key = self.next_label_key;
        self.next_label_key += 1;
        let label = self.labels.push(None);
        self.label_lookup.insert(key, label);
        label
    }

    /// Append `Label` at the current tail, binding `label` to it.
    pub fn bind_label(&mut self, label: Label) -> Result<AsmInst> {
        let inst = self.push(AsmOp::Label, Arg::ImmLabel(label), Arg::None);
        self.labels[label] = Some(inst);
        Ok(inst)
    }

    /// Append one virtual instruction at the tail of the list.
    pub fn push(&mut self, opcode: AsmOp, arg0: Arg, arg1: Arg) -> AsmInst {
        let inst = self.nodes.push(Node { opcode, arg0, arg1, prev: self.tail, next: None, removed: false });
        if let Some(tail) = self.tail {
            self.nodes[tail].next = Some(inst);
        } else {
            self.head = Some(inst);
        }
        self.tail = Some(inst);
        inst
    }

    /// Append an opaque instruction (inline asm expansion, runtime-helper call) with an explicit
    /// def/use set the devirtualizer must preserve rather than infer.
    pub fn push_opaque(&mut self, text_symbol: ssacc_ir::StringId, operands: Vec<VReg>) -> AsmInst {
        let inst = self.push(AsmOp::Opaque, Arg::ImmSymbol(text_symbol, 0), Arg::None);
        self.opaque_operands[inst] = operands;
        inst
    }

    /// The vregs an opaque instruction reads and writes, recorded at construction time.
    pub fn opaque_operands(&self, inst: AsmInst) -> &[VReg] {
        &self.opaque_operands[inst]
    }

    /// Insert a new instruction immediately before `before`.
    pub fn insert_before(&mut self, before: AsmInst, opcode: AsmOp, arg0: Arg, arg1: Arg) -> AsmInst {
        let prev = self.nodes[before].prev;
        let inst = self.nodes.push(Node { opcode, arg0, arg1, prev, next: Some(before), removed: false });
        match prev {
            Some(p) => self.nodes[p].next = Some(inst),
            None => self.head = Some(inst),
        }
        self.nodes[before].prev = Some(inst);
        inst
    }

    /// Unlink `inst` from the list without deallocating its slot (ids stay stable).
    pub fn remove(&mut self, inst: AsmInst) {
        let (prev, next) = (self.nodes[inst].prev, self.nodes[inst].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[inst].removed = true;
    }

    /// `true` if `inst` has been removed from the list.
    pub fn is_removed(&self, inst: AsmInst) -> bool {
        self.nodes[inst].removed
    }

    /// This instruction's opcode and operands.
    pub fn data(&self, inst: AsmInst) -> (AsmOp, &Arg, &Arg) {
        let node = &self.nodes[inst];
        (node.opcode, &node.arg0, &node.arg1)
    }

    /// Overwrite an instruction's operands in place (used by the devirtualizer to fold a vreg
    /// reference into a memory operand).
    pub fn set_args(&mut self, inst: AsmInst, arg0: Arg, arg1: Arg) {
        let node = &mut self.nodes[inst];
        node.arg0 = arg0;
        node.arg1 = arg1;
    }

    /// Overwrite an instruction's opcode in place (two-operand-form legalisation rewrites e.g.
    /// `Add` into a `Mov` + `Add` pair by changing the original node's opcode to `Mov` and
    /// inserting a new `Add` after it).
    pub fn set_opcode(&mut self, inst: AsmInst, opcode: AsmOp) {
        self.nodes[inst].opcode = opcode;
    }

    /// Walk the list head-to-tail in current program order.
    pub fn instructions(&self) -> impl Iterator<Item = AsmInst> + '_ {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let inst = cur?;
            cur = self.nodes[inst].next;
            Some(inst)
        })
    }

    /// Number of live (non-removed) instructions.
    pub fn len(&self) -> usize {
        self.instructions().count()
    }

    /// `true` if the context holds no live instructions.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

impl Default for AsmContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_walk_preserves_order() {
        let mut ctx = AsmContext::new();
        let v0 = ctx.new_vreg(RegClass::GeneralPurpose, Hint::None);
        let v1 = ctx.new_vreg(RegClass::GeneralPurpose, Hint::None);
        ctx.push(AsmOp::Mov, Arg::Virtual(v0), Arg::ImmInt(1));
        ctx.push(AsmOp::Add, Arg::Virtual(v1), Arg::Virtual(v0));
        let ordered: Vec<AsmOp> = ctx.instructions().map(|i| ctx.data(i).0).collect();
        assert_eq!(ordered, vec![AsmOp::Mov, AsmOp::Add]);
    }

    #[test]
    fn removal_keeps_the_surrounding_list_linked() {
        let mut ctx = AsmContext::new();
        let a = ctx.push(AsmOp::Nop, Arg::None, Arg::None);
        let b = ctx.push(AsmOp::Nop, Arg::None, Arg::None);
        let c = ctx.push(AsmOp::Nop, Arg::None, Arg::None);
        ctx.remove(b);
        assert_eq!(ctx.instructions().collect::<Vec<_>>(), vec![a, c]);
        assert!(ctx.is_removed(b));
    }

    #[test]
    fn insert_before_splices_in_order() {
        let mut ctx = AsmContext::new();
        let a = ctx.push(AsmOp::Nop, Arg::None, Arg::None);
        let inserted = ctx.insert_before(a, AsmOp::Mov, Arg::None, Arg::None);
        assert_eq!(ctx.instructions().collect::<Vec<_>>(), vec![inserted, a]);
    }

    #[test]
    fn source_map_rejects_overlap_and_resolves_lookup() {
        let mut map = SourceMap::new();
        let mut pool = ssacc_ir::StringPool::new();
        let file = pool.intern("a.c");
        map.insert(0, 4, file, 1, 1).unwrap();
        assert!(map.insert(2, 5, file, 2, 1).is_err());
        map.insert(4, 8, file, 2, 1).unwrap();
        assert_eq!(map.lookup(5), Some((file, 2, 1)));
        assert_eq!(map.lookup(100), None);
    }
}
