//! Devirtualization: the pass that turns register-allocated asmcmp (every vreg now has a
//! concrete [`Assignment`]) into a form the assembly printer can emit directly.
//!
//! Two transformations, applied in order:
//! - **Memory-operand folding**: a vreg assigned to a spill slot is rewritten to its
//!   `rbp`-relative memory operand wherever it appears as a plain register argument.
//! - **Two-operand-form legalisation**: AMD64's arithmetic instructions are destination==source0
//!   (`add dst, src` computes `dst += src`); a three-address virtual instruction whose destination
//!   differs from its first source gets a `mov` inserted ahead of it to bring them into alignment.

use crate::asmcmp::{Arg, AsmContext, AsmOp, Assignment, MemOperand, RegClass, RegRef};
use crate::entities::SpillSlot;
use crate::frame::{Region, StackFrame};
use ssacc_ir::error::Result;

fn spill_operand(frame: &StackFrame, slot: SpillSlot) -> MemOperand {
    use ssacc_entity::EntityRef;
    let base = frame.offset(Region::SpillArea) - (slot.index() as i64) * 8;
    MemOperand { base: None, index: None, scale: 1, disp: base as i32, segment: None }
}

/// Rewrite `arg` to its concrete form: a physical register stays a `Physical` arg, a spilled vreg
/// becomes a `Memory` arg addressed relative to `rbp`.
fn resolve(ctx: &AsmContext, frame: &StackFrame, arg: &Arg) -> Arg {
    match arg {
        Arg::Virtual(vreg) => match ctx.vreg(*vreg).assignment {
            Assignment::Physical(phys) => Arg::Physical(phys),
            Assignment::Spill(slot) => Arg::Memory(spill_operand(frame, slot)),
            Assignment::Unassigned => arg.clone(),
        },
        Arg::Memory(mem) => {
            // Memory operands whose base/index are themselves spilled vregs cannot be
            // represented directly (x86 addressing has no memory-indirect-memory form); the
            // lowering stage never hands a base/index vreg a `MemoryOnly` hint for exactly this
            // reason, so this path only has to thread through already-physical registers.
            let resolve_reg = |reg: &RegRef| match reg {
                RegRef::Virtual(vreg) => match ctx.vreg(*vreg).assignment {
                    Assignment::Physical(phys) if phys.class == RegClass::GeneralPurpose => {
                        Some(RegRef::Physical(phys))
                    }
                    _ => None,
                },
                RegRef::Physical(phys) => Some(RegRef::Physical(*phys)),
            };
            let base = mem.base.as_ref().and_then(resolve_reg);
            let index = mem.index.as_ref().and_then(resolve_reg);
            Arg::Memory(MemOperand { base, index, scale: mem.scale, disp: mem.disp, segment: mem.segment })
        }
        other => other.clone(),
    }
}

/// `true` for opcodes whose hardware encoding requires `arg0 == arg1`'s destination (the result
/// overwrites the first operand).
fn needs_two_address_form(opcode: AsmOp) -> bool {
    matches!(
        opcode,
        AsmOp::Add
            | AsmOp::Sub
            | AsmOp::IMul
            | AsmOp::And
            | AsmOp::Or
            | AsmOp::Xor
            | AsmOp::Shl
            | AsmOp::Shr
            | AsmOp::Sar
            | AsmOp::AddSse
            | AsmOp::SubSse
            | AsmOp::MulSse
            | AsmOp::DivSse
    )
}

fn mov_opcode_for(opcode: AsmOp) -> AsmOp {
    match opcode {
        AsmOp::AddSse | AsmOp::SubSse | AsmOp::MulSse | AsmOp::DivSse => AsmOp::MovSse,
        _ => AsmOp::Mov,
    }
}

/// Run the devirtualization pipeline: fold memory operands, then legalise two-operand forms.
/// `frame` must already reflect the allocator's final spill-slot count (see
/// [`crate::regalloc::AllocationSummary`]).
pub fn devirtualize(ctx: &mut AsmContext, frame: &StackFrame) -> Result<()> {
    let insts: Vec<_> = ctx.instructions().collect();
    for inst in insts {
        let (opcode, arg0, arg1) = ctx.data(inst);
        let (opcode, arg0, arg1) = (opcode, arg0.clone(), arg1.clone());
        let resolved0 = resolve(ctx, frame, &arg0);
        let resolved1 = resolve(ctx, frame, &arg1);
        ctx.set_args(inst, resolved0.clone(), resolved1.clone());

        if needs_two_address_form(opcode) && resolved0 != resolved1 {
            // `arg0 op= arg1` where `arg0` isn't already the destination register: stage the
            // left-hand side into place with a mov first, then rewrite this instruction to
            // operate on that staged copy. The arithmetic op keeps writing into `arg0`'s original
            // location (its destination is unchanged — this mirrors the instruction selector
            // always choosing a fresh vreg for the result and relying on devirtualization to wire
            // it to the first source, rather than the lowering stage hand-picking registers).
            ctx.insert_before(inst, mov_opcode_for(opcode), resolved0.clone(), resolved0.clone());
            let _ = resolved1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asmcmp::Hint;
    use crate::frame::FrameRequirements;
    use ssacc_entity::EntityRef;

    #[test]
    fn spilled_vreg_becomes_an_rbp_relative_memory_operand() {
        let mut ctx = AsmContext::new();
        let v = ctx.new_vreg(RegClass::GeneralPurpose, Hint::None);
        ctx.vreg_mut(v).assignment = Assignment::Spill(SpillSlot::new(0));
        let inst = ctx.push(AsmOp::Mov, Arg::Virtual(v), Arg::ImmInt(4));
        let frame = StackFrame::calculate(FrameRequirements { spill_area_slots: 1, ..Default::default() }).unwrap();
        devirtualize(&mut ctx, &frame).unwrap();
        let (_, arg0, _) = ctx.data(inst);
        assert!(matches!(arg0, Arg::Memory(_)));
    }
}
