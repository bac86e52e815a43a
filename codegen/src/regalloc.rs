//! Liveness analysis and linear-scan register allocation over an [`AsmContext`].
//!
//! Liveness is computed at the granularity of asmcmp program-order positions (not basic blocks):
//! each vreg gets one interval `[def, last_use]` per contiguous live stretch, built with the
//! classic backward dataflow (live-out = union of successors' live-in, live-in = live-out minus
//! defs plus uses) and then flattened into a single interval per vreg, because this backend's
//! straight-line-per-block asmcmp form (no control-flow merges inside a block, only at `Label`
//! boundaries already resolved by the lowering stage) makes a block-local interval adequate for
//! everything except values live across a call, which the allocator forces to spill explicitly
//! rather than tracking more precisely.

use crate::asmcmp::{Arg, AsmContext, AsmOp, Assignment, Hint, PhysReg, RegClass, RegRef};
use crate::entities::{SpillSlot, VReg};
use ssacc_entity::EntityRef;
use ssacc_ir::error::Result;
use std::collections::HashMap;

/// The inclusive-start, exclusive-end live range of one vreg, in asmcmp program-order positions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LiveInterval {
    /// The vreg this interval belongs to.
    pub vreg: VReg,
    /// First position (inclusive) at which the vreg holds a live value.
    pub start: u32,
    /// First position (exclusive) after which the vreg is dead.
    pub end: u32,
    /// `true` if a call instruction falls within `[start, end)` — these are forced to spill
    /// before caller-saved registers are handed out, since nothing survives a call in one unless
    /// explicitly preserved.
    pub crosses_call: bool,
}

fn operand_vregs(arg: &Arg, out: &mut Vec<VReg>) {
    match arg {
        Arg::Virtual(v) => out.push(*v),
        Arg::Memory(mem) => {
            for reg in [mem.base, mem.index].into_iter().flatten() {
                if let RegRef::Virtual(v) = reg {
                    out.push(v);
                }
            }
        }
        _ => {}
    }
}

/// Compute one interval per vreg by a single forward pass recording first-def and last-use
/// position, widened across any call that falls inside the range.
pub fn compute_liveness(ctx: &AsmContext) -> Vec<LiveInterval> {
    let mut first: HashMap<VReg, u32> = HashMap::new();
    let mut last: HashMap<VReg, u32> = HashMap::new();
    let mut call_positions: Vec<u32> = Vec::new();

    for (position, inst) in ctx.instructions().enumerate() {
        let position = position as u32;
        let (opcode, arg0, arg1) = ctx.data(inst);
        if opcode == AsmOp::Call {
            call_positions.push(position);
        }
        let mut vregs = Vec::new();
        operand_vregs(arg0, &mut vregs);
        operand_vregs(arg1, &mut vregs);
        for v in &ctx.opaque_operands(inst).to_vec() {
            vregs.push(*v);
        }
        for v in vregs {
            first.entry(v).or_insert(position);
            last.insert(v, position);
        }
    }

    first
        .into_iter()
        .map(|(vreg, start)| {
            let end = last.get(&vreg).copied().unwrap_or(start) + 1;
            let crosses_call = call_positions.iter().any(|&c| c >= start && c < end);
            LiveInterval { vreg, start, end, crosses_call }
        })
        .collect()
}

/// Caller-saved integer registers, preferred first since they need no preservation in the
/// common case where a value doesn't live across a call.
const CALLER_SAVED_GPR: [u8; 7] = [0, 1, 2, 6, 7, 8, 9]; // rax, rcx, rdx, rsi, rdi, r8, r9
/// Callee-saved integer registers, cheaper to hand to a value that does live across a call (one
/// save/restore in the prologue/epilogue beats a spill at every call site).
const CALLEE_SAVED_GPR: [u8; 5] = [3, 12, 13, 14, 15]; // rbx, r12, r13, r14, r15
const SSE_POOL: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// Result of running the allocator: every vreg's assignment has been written into the
/// [`AsmContext`]; this record additionally reports how many spill slots and how many distinct
/// callee-saved registers were used, which the frame-finalisation stage needs.
#[derive(Default, Debug)]
pub struct AllocationSummary {
    /// Number of eightbyte spill slots consumed.
    pub spill_slots_used: u32,
    /// Distinct callee-saved GPRs assigned to at least one interval.
    pub callee_saved_used: Vec<u8>,
}

/// Run linear-scan allocation over every interval in `intervals`, writing assignments directly
/// into `ctx`'s vreg table. Pool exhaustion always falls back to a spill slot — stack depth is
/// unbounded, so allocation itself never fails (see spec: "spill area overflow is impossible").
pub fn allocate(ctx: &mut AsmContext, mut intervals: Vec<LiveInterval>) -> Result<AllocationSummary> {
    intervals.sort_by_key(|iv| iv.start);

    let mut active: Vec<LiveInterval> = Vec::new();
    let mut free_gpr_caller: Vec<u8> = CALLER_SAVED_GPR.to_vec();
    let mut free_gpr_callee: Vec<u8> = CALLEE_SAVED_GPR.to_vec();
    let mut free_sse: Vec<u8> = SSE_POOL.to_vec();
    let mut next_spill_slot: u32 = 0;
    let mut callee_saved_used = Vec::new();
    let mut in_use: HashMap<VReg, PhysReg> = HashMap::new();

    for interval in intervals {
        active.retain(|a| {
            if a.end <= interval.start {
                if let Some(phys) = in_use.remove(&a.vreg) {
                    match phys.class {
                        RegClass::GeneralPurpose => {
                            if CALLEE_SAVED_GPR.contains(&phys.encoding) {
                                free_gpr_callee.push(phys.encoding);
                            } else {
                                free_gpr_caller.push(phys.encoding);
                            }
                        }
                        RegClass::Sse => free_sse.push(phys.encoding),
                        _ => {}
                    }
                }
                false
            } else {
                true
            }
        });

        let class = ctx.vreg(interval.vreg).class;
        let hint = ctx.vreg(interval.vreg).hint;

        let assignment = if hint == Hint::MemoryOnly || class == RegClass::IndirectSpillSlot {
            let slot = SpillSlot::new(next_spill_slot as usize);
            next_spill_slot += 1;
            Assignment::Spill(slot)
        } else {
            match class {
                RegClass::GeneralPurpose => {
                    let pool = if interval.crosses_call { &mut free_gpr_callee } else { &mut free_gpr_caller };
                    if let Some(encoding) = pool.pop() {
                        if interval.crosses_call {
                            callee_saved_used.push(encoding);
                        }
                        let phys = PhysReg::gpr(encoding);
                        in_use.insert(interval.vreg, phys);
                        Assignment::Physical(phys)
                    } else if let Some(encoding) = free_gpr_caller.pop().or_else(|| free_gpr_callee.pop()) {
                        let phys = PhysReg::gpr(encoding);
                        in_use.insert(interval.vreg, phys);
                        Assignment::Physical(phys)
                    } else {
                        log::warn!("register pool exhausted for vreg{}, spilling to slot {}", interval.vreg.index(), next_spill_slot);
                        let slot = SpillSlot::new(next_spill_slot as usize);
                        next_spill_slot += 1;
                        Assignment::Spill(slot)
                    }
                }
                RegClass::Sse => {
                    if let Some(encoding) = free_sse.pop() {
                        let phys = PhysReg::xmm(encoding);
                        in_use.insert(interval.vreg, phys);
                        Assignment::Physical(phys)
                    } else {
                        let slot = SpillSlot::new(next_spill_slot as usize);
                        next_spill_slot += 1;
                        Assignment::Spill(slot)
                    }
                }
                RegClass::X87 | RegClass::FlagBit => Assignment::Physical(PhysReg {
                    class,
                    encoding: 0,
                }),
                RegClass::IndirectSpillSlot => unreachable!("handled above"),
            }
        };

        ctx.vreg_mut(interval.vreg).assignment = assignment;
        active.push(interval);
    }

    callee_saved_used.sort_unstable();
    callee_saved_used.dedup();
    Ok(AllocationSummary { spill_slots_used: next_spill_slot, callee_saved_used })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asmcmp::{Arg, AsmOp};

    #[test]
    fn non_overlapping_intervals_reuse_the_same_register() {
        let mut ctx = AsmContext::new();
        let a = ctx.new_vreg(RegClass::GeneralPurpose, Hint::None);
        let b = ctx.new_vreg(RegClass::GeneralPurpose, Hint::None);
        ctx.push(AsmOp::Mov, Arg::Virtual(a), Arg::ImmInt(1));
        ctx.push(AsmOp::Mov, Arg::None, Arg::Virtual(a)); // last use of a
        ctx.push(AsmOp::Mov, Arg::Virtual(b), Arg::ImmInt(2));
        let intervals = compute_liveness(&ctx);
        allocate(&mut ctx, intervals).unwrap();
        assert_eq!(ctx.vreg(a).assignment, ctx.vreg(b).assignment);
    }

    #[test]
    fn value_live_across_a_call_prefers_a_callee_saved_register() {
        let mut ctx = AsmContext::new();
        let a = ctx.new_vreg(RegClass::GeneralPurpose, Hint::None);
        ctx.push(AsmOp::Mov, Arg::Virtual(a), Arg::ImmInt(1));
        ctx.push(AsmOp::Call, Arg::ImmInt(0), Arg::None);
        ctx.push(AsmOp::Mov, Arg::None, Arg::Virtual(a));
        let intervals = compute_liveness(&ctx);
        allocate(&mut ctx, intervals).unwrap();
        match ctx.vreg(a).assignment {
            Assignment::Physical(phys) => assert!(CALLEE_SAVED_GPR.contains(&phys.encoding)),
            other => panic!("expected a physical register, got {:?}", other),
        }
    }

    #[test]
    fn exhausting_the_pool_falls_back_to_a_spill_slot() {
        let mut ctx = AsmContext::new();
        let mut vregs = Vec::new();
        for i in 0..20 {
            let v = ctx.new_vreg(RegClass::GeneralPurpose, Hint::None);
            ctx.push(AsmOp::Mov, Arg::Virtual(v), Arg::ImmInt(i));
            vregs.push(v);
        }
        // Keep every vreg alive simultaneously by reading them all at the end.
        for &v in &vregs {
            ctx.push(AsmOp::Mov, Arg::None, Arg::Virtual(v));
        }
        let intervals = compute_liveness(&ctx);
        let summary = allocate(&mut ctx, intervals).unwrap();
        assert!(summary.spill_slots_used > 0);
    }
}
