//! The stack frame model: the fixed bottom-to-top region order a function's frame is built from,
//! and the three parallel views (requested options, computed sizes, computed offsets) the
//! prologue/epilogue emitter and the register allocator's spill logic both read from.

use ssacc_abi::layout::pad_aligned;
use ssacc_ir::error::Result;

/// One fixed region of a function's stack frame, in the bottom-to-top order they are laid out at
/// entry (lowest address first, growing toward the caller's frame).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    /// 8-byte saved `rbp`, present only if a frame pointer is required.
    PreviousBase,
    /// 8 bytes per callee-saved GPR the allocator actually used.
    PreservedRegs,
    /// 4-byte saved x87 control word, present only if the function alters it.
    X87ControlWord,
    /// 4-byte saved `MXCSR`, present only if the function alters it.
    Mxcsr,
    /// C locals, laid out by the ABI type-layout engine over the function's locals type.
    LocalArea,
    /// Register-spill storage; sized by the allocator's `spill_area_slots` requirement.
    SpillArea,
    /// Scratch space for variadic/struct-return staging.
    TemporaryArea,
    /// Register-save area for a variadic function's prologue.
    VarargArea,
    /// The stack pointer's position after the whole frame has been subtracted; not itself
    /// storage, but a named boundary so `offset(TopOfFrame)` gives the total frame size.
    TopOfFrame,
}

const REGION_ORDER: [Region; 9] = [
    Region::PreviousBase,
    Region::PreservedRegs,
    Region::X87ControlWord,
    Region::Mxcsr,
    Region::LocalArea,
    Region::SpillArea,
    Region::TemporaryArea,
    Region::VarargArea,
    Region::TopOfFrame,
];

/// Which optional regions a function's frame needs, decided by the codegen driver before frame
/// finalisation (some are only known once lowering and register allocation have both run).
#[derive(Clone, Debug, Default)]
pub struct FrameRequirements {
    /// A frame pointer is required: debug info needs it, or a variable-size allocation makes
    /// `rsp`-relative addressing of locals unsafe.
    pub frame_pointer: bool,
    /// Number of callee-saved GPRs the allocator assigned at least one live range to.
    pub preserved_gpr_count: u32,
    /// The function alters the x87 control word and must save/restore it.
    pub save_x87_control_word: bool,
    /// The function alters `MXCSR` and must save/restore it.
    pub save_mxcsr: bool,
    /// Size in bytes of the local-variable area, from the ABI layout of the locals type.
    pub local_area_size: u64,
    /// Alignment the local-variable area requires.
    pub local_area_alignment: u64,
    /// Number of eightbyte spill slots the register allocator needed.
    pub spill_area_slots: u32,
    /// Bytes of scratch the lowering stage requested for variadic/struct-return staging.
    pub temporary_area_size: u64,
    /// Alignment the temporary area requires.
    pub temporary_area_alignment: u64,
    /// `true` for a variadic function: reserves the register-save area integer/SSE slots.
    pub is_variadic: bool,
    /// `true` if the function contains a VLA or `alloca`, so the stack pointer varies at runtime
    /// and the epilogue must restore `rsp` from `rbp` rather than adding back a constant.
    pub varying_stack_pointer: bool,
}

/// The register-save area size for a variadic prologue: 6 integer registers plus 8 SSE
/// registers, each 8 bytes (the System V ABI reserves 16 bytes per SSE slot for alignment, but
/// only the low 8 are ever read by `va_arg`; this backend reserves the full 16 to keep the area
/// naturally aligned for `movaps`).
const VARARG_INT_REGS: u64 = 6;
const VARARG_SSE_REGS: u64 = 8;
const VARARG_SSE_SLOT_SIZE: u64 = 16;

fn region_size(region: Region, req: &FrameRequirements) -> u64 {
    match region {
        Region::PreviousBase => if req.frame_pointer { 8 } else { 0 },
        Region::PreservedRegs => req.preserved_gpr_count as u64 * 8,
        Region::X87ControlWord => if req.save_x87_control_word { 4 } else { 0 },
        Region::Mxcsr => if req.save_mxcsr { 4 } else { 0 },
        Region::LocalArea => req.local_area_size,
        Region::SpillArea => req.spill_area_slots as u64 * 8,
        Region::TemporaryArea => req.temporary_area_size,
        Region::VarargArea => {
            if req.is_variadic {
                VARARG_INT_REGS * 8 + VARARG_SSE_REGS * VARARG_SSE_SLOT_SIZE
            } else {
                0
            }
        }
        Region::TopOfFrame => 0,
    }
}

fn region_alignment(region: Region, req: &FrameRequirements) -> u64 {
    match region {
        Region::LocalArea => req.local_area_alignment.max(1),
        Region::TemporaryArea => req.temporary_area_alignment.max(1),
        Region::VarargArea => 16,
        _ => 8,
    }
}

/// A fully laid-out frame: per-region sizes, offsets (from `rbp`, growing downward — a more
/// negative offset is further from the return address), and the requirements the sizes and
/// offsets were derived from.
#[derive(Clone, Debug)]
pub struct StackFrame {
    requirements: FrameRequirements,
    sizes: Vec<u64>,
    offsets: Vec<i64>,
}

impl StackFrame {
    /// Lay out a frame from `requirements`. `calculate` in the design's naming; sizes are derived
    /// directly from the requirements record, offsets by walking the fixed region order and
    /// padding each region to its alignment before placing it.
    pub fn calculate(requirements: FrameRequirements) -> Result<Self> {
        let mut sizes = Vec::with_capacity(REGION_ORDER.len());
        let mut offsets = Vec::with_capacity(REGION_ORDER.len());
        // Offsets grow downward from rbp (negative = further into the frame); `cursor` tracks the
        // byte distance already allocated below rbp.
        let mut cursor: u64 = 0;
        for &region in REGION_ORDER.iter() {
            let size = region_size(region, &requirements);
            let alignment = region_alignment(region, &requirements);
            cursor = pad_aligned(cursor, alignment);
            offsets.push(-(cursor as i64));
            sizes.push(size);
            cursor += size;
        }
        // The frame itself must leave rsp 16-byte aligned at the call site per System V; the
        // `call` instruction's return-address push already accounts for 8 of those, so the
        // region total that gets subtracted from rsp must itself be a multiple of 16 minus 8,
        // when a frame pointer is pushed (the push of rbp covers the other 8).
        let total = cursor;
        let top_index = REGION_ORDER.iter().position(|&r| r == Region::TopOfFrame).unwrap();
        offsets[top_index] = -(pad_aligned(total, 16) as i64);

        Ok(StackFrame { requirements, sizes, offsets })
    }

    fn index_of(region: Region) -> usize {
        REGION_ORDER.iter().position(|&r| r == region).expect("every Region is in REGION_ORDER")
    }

    /// Size in bytes of `region`.
    pub fn size(&self, region: Region) -> u64 {
        self.sizes[Self::index_of(region)]
    }

    /// Offset of `region`'s start from `rbp`. Negative for every region below the saved
    /// return-address/base-pointer pair, as is conventional for AMD64 frames.
    pub fn offset(&self, region: Region) -> i64 {
        self.offsets[Self::index_of(region)]
    }

    /// The requirements this frame was computed from.
    pub fn requirements(&self) -> &FrameRequirements {
        &self.requirements
    }

    /// Total frame size: how much the prologue subtracts from `rsp` after pushing `rbp` (or, if
    /// no frame pointer is used, the total subtracted directly from `rsp`).
    pub fn total_size(&self) -> u64 {
        (-self.offset(Region::TopOfFrame)) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_requirements_produce_a_zero_frame() {
        let frame = StackFrame::calculate(FrameRequirements::default()).unwrap();
        assert_eq!(frame.total_size(), 0);
    }

    #[test]
    fn local_area_and_spill_area_are_both_reserved() {
        let req = FrameRequirements {
            frame_pointer: true,
            local_area_size: 24,
            local_area_alignment: 8,
            spill_area_slots: 3,
            ..Default::default()
        };
        let frame = StackFrame::calculate(req).unwrap();
        assert_eq!(frame.size(Region::LocalArea), 24);
        assert_eq!(frame.size(Region::SpillArea), 24);
        assert!(frame.total_size() >= 48);
        assert_eq!(frame.total_size() % 16, 0);
    }

    #[test]
    fn variadic_function_reserves_the_register_save_area() {
        let req = FrameRequirements { is_variadic: true, ..Default::default() };
        let frame = StackFrame::calculate(req).unwrap();
        assert_eq!(frame.size(Region::VarargArea), VARARG_INT_REGS * 8 + VARARG_SSE_REGS * VARARG_SSE_SLOT_SIZE);
    }

    #[test]
    fn total_size_is_always_16_byte_aligned() {
        for slots in 0..5u32 {
            let req = FrameRequirements { spill_area_slots: slots, local_area_size: 5, ..Default::default() };
            let frame = StackFrame::calculate(req).unwrap();
            assert_eq!(frame.total_size() % 16, 0);
        }
    }
}
