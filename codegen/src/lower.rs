//! Lowers one optimizer [`Container`] into asmcmp virtual assembly.
//!
//! Walks blocks in declaration order (the optimizer already normalises program order; no separate
//! RPO pass is needed since the container never reorders blocks behind a pass's back), binds one
//! label per block up front so forward branches resolve, then dispatches each instruction to a
//! small per-opcode selector. Every SSA value gets exactly one vreg, created lazily the first time
//! it is produced; opcodes this selector doesn't recognise are rejected with `invalid_state`
//! rather than silently mis-lowered, per the condition this backend promises to fail under rather
//! than produce wrong code for.

use crate::asmcmp::{Arg, AsmContext, AsmOp, Hint, MemOperand, RegClass, RegRef};
use crate::entities::{Label, VReg};
use ssacc_abi::classify::{FunctionClassification, Placement};
use ssacc_ir::error::{self, Result};
use ssacc_ir::opcode::{CmpOp, Param};
use ssacc_ir::Opcode;
use ssacc_entity::{EntityRef, SecondaryMap};
use ssacc_optimizer::{Block, Container, Inst};
use std::collections::HashMap;

/// System V's integer argument registers, in passing order, named by their GPR encoding (see
/// `GPR_NAMES` in `asmcmp`): `rdi, rsi, rdx, rcx, r8, r9`.
const SYSV_INT_ARG_GPR: [u8; 6] = [7, 6, 2, 1, 8, 9];

fn int_class() -> RegClass {
    RegClass::GeneralPurpose
}

fn float_class() -> RegClass {
    RegClass::Sse
}

/// Per-function lowering state: the vreg each SSA value has been assigned, and the label each
/// block begins at.
pub struct Lowering<'a> {
    container: &'a Container,
    values: SecondaryMap<Inst, Option<VReg>>,
    labels: HashMap<Block, Label>,
}

impl<'a> Lowering<'a> {
    fn value_vreg(&mut self, ctx: &mut AsmContext, value: Inst, class: RegClass) -> VReg {
        if let Some(v) = self.values[value] {
            return v;
        }
        let v = ctx.new_vreg(class, Hint::None);
        self.values[value] = Some(v);
        v
    }

    fn operand_arg(&mut self, ctx: &mut AsmContext, value: Inst, class: RegClass) -> Arg {
        Arg::Virtual(self.value_vreg(ctx, value, class))
    }

    fn block_label(&mut self, ctx: &mut AsmContext, block: Block) -> Label {
        *self.labels.entry(block).or_insert_with(|| ctx.new_label())
    }
}

/// Lower every parameter's ABI placement into a `mov` from its incoming physical location into a
/// fresh vreg, so the body can reference parameters the same way it references any other value.
fn lower_parameter_prologue(
    ctx: &mut AsmContext,
    lowering: &mut Lowering,
    entry: Block,
    classification: &FunctionClassification,
) -> Result<()> {
    let entry_values = lowering.container.block_instructions(entry)?;
    // The entry block's first N instructions correspond one-to-one with the function's N
    // parameters, in declaration order; this is a convention the translator upholds, not
    // something derivable from the legacy encoding itself. Multi-eightbyte parameters (a small
    // aggregate split across two registers) bind only their first eightbyte here; composing the
    // rest into one scalar value is left to a future aggregate-lowering pass.
    for (index, parameter) in classification.parameters.iter().enumerate() {
        let Some(&value) = entry_values.get(index) else { break };
        let Some(placement) = parameter.placements.first() else { continue };
        match placement {
            Placement::IntegerRegister(reg_index) => {
                let dst = lowering.value_vreg(ctx, value, int_class());
                let encoding = SYSV_INT_ARG_GPR[*reg_index as usize];
                ctx.push(AsmOp::Mov, Arg::Virtual(dst), Arg::Physical(crate::asmcmp::PhysReg::gpr(encoding)));
            }
            Placement::SseRegister(reg) => {
                let dst = lowering.value_vreg(ctx, value, float_class());
                ctx.push(AsmOp::MovSse, Arg::Virtual(dst), Arg::Physical(crate::asmcmp::PhysReg::xmm(*reg)));
            }
            Placement::Stack(offset) => {
                let dst = lowering.value_vreg(ctx, value, int_class());
                let mem = MemOperand { base: None, index: None, scale: 1, disp: (16 + offset) as i32, segment: None };
                ctx.push(AsmOp::Mov, Arg::Virtual(dst), Arg::Memory(mem));
            }
            Placement::X87 => {}
            Placement::ImplicitPointer => {
                let dst = lowering.value_vreg(ctx, value, int_class());
                ctx.push(AsmOp::Mov, Arg::Virtual(dst), Arg::Physical(crate::asmcmp::PhysReg::gpr(7))); // rdi
            }
        }
    }
    Ok(())
}

/// AMD64 condition-code encoding asmcmp's `SetCc`/`Jcc` carry as an immediate in place of a real
/// flags-register value type (flags aren't virtual-registered; they're produced by the immediately
/// preceding `cmp`/`test` and consumed by exactly one `SetCc`/`Jcc`, mirroring how the hardware
/// itself has no addressable flags storage between those two instructions).
fn condition_code(compare: CmpOp) -> i64 {
    match compare {
        CmpOp::Eq => 0,
        CmpOp::Ne => 1,
        CmpOp::Lt => 2,
        CmpOp::Le => 3,
        CmpOp::Gt => 4,
        CmpOp::Ge => 5,
    }
}

const CC_EQUAL: i64 = 0;
const CC_NOT_EQUAL: i64 = 1;

fn lower_instruction(ctx: &mut AsmContext, lowering: &mut Lowering, inst: Inst) -> Result<()> {
    let instruction = lowering.container.instruction(inst)?.clone();
    let opcode = instruction.opcode;
    let operands = instruction.operands.clone();
    let param = instruction.param.clone();

    match opcode {
        Opcode::ConstInt => {
            let dst = lowering.value_vreg(ctx, inst, int_class());
            let imm = match param {
                Param::Int(v) => v,
                _ => return Err(error::invalid_state("ConstInt without an Int param")),
            };
            ctx.push(AsmOp::Mov, Arg::Virtual(dst), Arg::ImmInt(imm));
        }
        Opcode::ConstSymbolRef => {
            let dst = lowering.value_vreg(ctx, inst, int_class());
            let symbol = match param {
                Param::Symbol(id) => id,
                _ => return Err(error::invalid_state("ConstSymbolRef without a Symbol param")),
            };
            ctx.push(AsmOp::Lea, Arg::Virtual(dst), Arg::ImmSymbol(symbol, 0));
        }
        Opcode::IntAdd | Opcode::IntSub | Opcode::BitAnd | Opcode::BitOr | Opcode::BitXor => {
            let lhs = operands[0];
            let rhs = operands[1];
            let lhs_arg = lowering.operand_arg(ctx, lhs, int_class());
            let rhs_arg = lowering.operand_arg(ctx, rhs, int_class());
            let dst = lowering.value_vreg(ctx, inst, int_class());
            let op = match opcode {
                Opcode::IntAdd => AsmOp::Add,
                Opcode::IntSub => AsmOp::Sub,
                Opcode::BitAnd => AsmOp::And,
                Opcode::BitOr => AsmOp::Or,
                Opcode::BitXor => AsmOp::Xor,
                _ => unreachable!(),
            };
            ctx.push(AsmOp::Mov, Arg::Virtual(dst), lhs_arg);
            ctx.push(op, Arg::Virtual(dst), rhs_arg);
        }
        Opcode::IntMul => {
            let lhs_arg = lowering.operand_arg(ctx, operands[0], int_class());
            let rhs_arg = lowering.operand_arg(ctx, operands[1], int_class());
            let dst = lowering.value_vreg(ctx, inst, int_class());
            ctx.push(AsmOp::Mov, Arg::Virtual(dst), lhs_arg);
            ctx.push(AsmOp::IMul, Arg::Virtual(dst), rhs_arg);
        }
        Opcode::ShiftLeft | Opcode::ShiftRight | Opcode::ArithShiftRight => {
            let lhs_arg = lowering.operand_arg(ctx, operands[0], int_class());
            let rhs_arg = lowering.operand_arg(ctx, operands[1], int_class());
            let dst = lowering.value_vreg(ctx, inst, int_class());
            let op = match opcode {
                Opcode::ShiftLeft => AsmOp::Shl,
                Opcode::ShiftRight => AsmOp::Shr,
                Opcode::ArithShiftRight => AsmOp::Sar,
                _ => unreachable!(),
            };
            ctx.push(AsmOp::Mov, Arg::Virtual(dst), lhs_arg);
            ctx.push(op, Arg::Virtual(dst), rhs_arg);
        }
        Opcode::IntNeg => {
            let src_arg = lowering.operand_arg(ctx, operands[0], int_class());
            let dst = lowering.value_vreg(ctx, inst, int_class());
            ctx.push(AsmOp::Mov, Arg::Virtual(dst), src_arg);
            ctx.push(AsmOp::Neg, Arg::Virtual(dst), Arg::None);
        }
        Opcode::BitNot | Opcode::BoolNot => {
            let src_arg = lowering.operand_arg(ctx, operands[0], int_class());
            let dst = lowering.value_vreg(ctx, inst, int_class());
            ctx.push(AsmOp::Mov, Arg::Virtual(dst), src_arg);
            ctx.push(AsmOp::Not, Arg::Virtual(dst), Arg::None);
        }
        Opcode::FloatAdd | Opcode::FloatSub | Opcode::FloatMul | Opcode::FloatDiv => {
            let lhs_arg = lowering.operand_arg(ctx, operands[0], float_class());
            let rhs_arg = lowering.operand_arg(ctx, operands[1], float_class());
            let dst = lowering.value_vreg(ctx, inst, float_class());
            let op = match opcode {
                Opcode::FloatAdd => AsmOp::AddSse,
                Opcode::FloatSub => AsmOp::SubSse,
                Opcode::FloatMul => AsmOp::MulSse,
                Opcode::FloatDiv => AsmOp::DivSse,
                _ => unreachable!(),
            };
            ctx.push(AsmOp::MovSse, Arg::Virtual(dst), lhs_arg);
            ctx.push(op, Arg::Virtual(dst), rhs_arg);
        }
        Opcode::FloatNeg => {
            // No dedicated negate opcode at the asmcmp layer (the printer has no sign-mask
            // constant pool to xor against yet); `dst = src - src - src` reaches `-src` in two
            // instructions the allocator already knows how to schedule.
            let src_arg = lowering.operand_arg(ctx, operands[0], float_class());
            let dst = lowering.value_vreg(ctx, inst, float_class());
            ctx.push(AsmOp::MovSse, Arg::Virtual(dst), src_arg.clone());
            ctx.push(AsmOp::SubSse, Arg::Virtual(dst), src_arg.clone());
            ctx.push(AsmOp::SubSse, Arg::Virtual(dst), src_arg);
        }
        Opcode::IntCompareSigned | Opcode::IntCompareUnsigned => {
            let lhs_arg = lowering.operand_arg(ctx, operands[0], int_class());
            let rhs_arg = lowering.operand_arg(ctx, operands[1], int_class());
            let dst = lowering.value_vreg(ctx, inst, int_class());
            let compare = match param {
                Param::Compare(c) => c,
                _ => return Err(error::invalid_state("int compare without a Compare param")),
            };
            ctx.push(AsmOp::Cmp, lhs_arg, rhs_arg);
            ctx.push(AsmOp::SetCc, Arg::Virtual(dst), Arg::ImmInt(condition_code(compare)));
        }
        Opcode::Load => {
            let addr_arg = lowering.operand_arg(ctx, operands[0], int_class());
            let dst = lowering.value_vreg(ctx, inst, int_class());
            let base = match addr_arg {
                Arg::Virtual(v) => Some(RegRef::Virtual(v)),
                _ => None,
            };
            ctx.push(AsmOp::Mov, Arg::Virtual(dst), Arg::Memory(MemOperand { base, index: None, scale: 1, disp: 0, segment: None }));
        }
        Opcode::Store => {
            let addr_arg = lowering.operand_arg(ctx, operands[0], int_class());
            let value_arg = lowering.operand_arg(ctx, operands[1], int_class());
            let base = match addr_arg {
                Arg::Virtual(v) => Some(RegRef::Virtual(v)),
                _ => None,
            };
            ctx.push(AsmOp::Mov, Arg::Memory(MemOperand { base, index: None, scale: 1, disp: 0, segment: None }), value_arg);
        }
        Opcode::Jump => {
            let target = match param {
                Param::Block(raw) => Block::new(raw as usize),
                _ => return Err(error::invalid_state("Jump without a Block param")),
            };
            let label = lowering.block_label(ctx, target);
            ctx.push(AsmOp::Jmp, Arg::ImmLabel(label), Arg::None);
        }
        Opcode::Branch => {
            let cond_arg = lowering.operand_arg(ctx, operands[0], int_class());
            let (then_raw, else_raw) = match param {
                Param::BlockPair(a, b) => (a, b),
                _ => return Err(error::invalid_state("Branch without a BlockPair param")),
            };
            let then_label = lowering.block_label(ctx, Block::new(then_raw as usize));
            let else_label = lowering.block_label(ctx, Block::new(else_raw as usize));
            ctx.push(AsmOp::Test, cond_arg.clone(), cond_arg);
            ctx.push(AsmOp::Jcc, Arg::ImmLabel(then_label), Arg::ImmInt(CC_NOT_EQUAL));
            ctx.push(AsmOp::Jmp, Arg::ImmLabel(else_label), Arg::None);
        }
        Opcode::Return => {
            if let Some(&value) = operands.first() {
                let value_arg = lowering.operand_arg(ctx, value, int_class());
                ctx.push(AsmOp::Mov, Arg::Physical(crate::asmcmp::PhysReg::gpr(0)), value_arg);
            }
            ctx.push(AsmOp::Ret, Arg::None, Arg::None);
        }
        Opcode::Select => {
            // No cmov at the asmcmp layer yet; branch around the two moves instead.
            let cond_arg = lowering.operand_arg(ctx, operands[0], int_class());
            let then_arg = lowering.operand_arg(ctx, operands[1], int_class());
            let else_arg = lowering.operand_arg(ctx, operands[2], int_class());
            let dst = lowering.value_vreg(ctx, inst, int_class());
            let else_label = ctx.new_label();
            let end_label = ctx.new_label();
            ctx.push(AsmOp::Test, cond_arg.clone(), cond_arg);
            ctx.push(AsmOp::Jcc, Arg::ImmLabel(else_label), Arg::ImmInt(CC_EQUAL));
            ctx.push(AsmOp::Mov, Arg::Virtual(dst), then_arg);
            ctx.push(AsmOp::Jmp, Arg::ImmLabel(end_label), Arg::None);
            ctx.bind_label(else_label)?;
            ctx.push(AsmOp::Mov, Arg::Virtual(dst), else_arg);
            ctx.bind_label(end_label)?;
        }
        Opcode::Unreachable => {
            ctx.push(AsmOp::Opaque, Arg::None, Arg::None);
        }
        other => {
            return Err(error::invalid_state(format!(
                "codegen lowering does not recognise opcode {:?}",
                other
            )));
        }
    }
    Ok(())
}

/// Lower every block of `container` into `ctx`, returning the label each block was bound to.
pub fn lower_function(
    ctx: &mut AsmContext,
    container: &Container,
    classification: &FunctionClassification,
) -> Result<HashMap<Block, Label>> {
    let mut lowering = Lowering { container, values: SecondaryMap::new(), labels: HashMap::new() };

    let blocks: Vec<Block> = container.blocks().collect();
    for &block in &blocks {
        lowering.block_label(ctx, block);
    }

    for (index, &block) in blocks.iter().enumerate() {
        let label = lowering.block_label(ctx, block);
        ctx.bind_label(label)?;
        if index == 0 {
            lower_parameter_prologue(ctx, &mut lowering, block, classification)?;
        }
        for &inst in container.block_instructions(block)? {
            lower_instruction(ctx, &mut lowering, inst)?;
        }
    }

    Ok(lowering.labels)
}
