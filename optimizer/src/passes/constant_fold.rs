//! Folds arithmetic whose operands are all compile-time constants.
//!
//! Folding rewrites the instruction in place into a `const-*` of the same result (see
//! [`Container::replace_instruction_in_place`]) rather than appending a new instruction, so a
//! folded value keeps its program-order position relative to its users.
//!
//! Overflow-checked opcodes fold to the wrapped arithmetic result the same as their unchecked
//! counterparts; this pass does not separately materialise the overflow flag a checked opcode
//! would otherwise report; a backend pattern-selector that needs the flag matches the unfolded
//! opcode directly instead.

use super::{Pass, PipelineConfig};
use crate::container::Container;
use crate::entities::Value;
use ssacc_ir::error::Result;
use ssacc_ir::opcode::{OperandList, Param};
use ssacc_ir::Opcode;

/// See module docs.
pub struct ConstantFold;

fn const_int(container: &Container, value: Value) -> Option<i64> {
    let data = container.instruction(value).ok()?;
    match (data.opcode, &data.param) {
        (Opcode::ConstInt, Param::Int(n)) => Some(*n),
        _ => None,
    }
}

fn const_f64(container: &Container, value: Value) -> Option<f64> {
    let data = container.instruction(value).ok()?;
    match (data.opcode, &data.param) {
        (Opcode::ConstF64, Param::F64(n)) => Some(*n),
        _ => None,
    }
}

fn fold_int_binary(opcode: Opcode, lhs: i64, rhs: i64) -> Option<i64> {
    Some(match opcode {
        Opcode::IntAdd | Opcode::CheckedSignedAdd | Opcode::CheckedUnsignedAdd => {
            lhs.wrapping_add(rhs)
        }
        Opcode::IntSub | Opcode::CheckedSignedSub | Opcode::CheckedUnsignedSub => {
            lhs.wrapping_sub(rhs)
        }
        Opcode::IntMul | Opcode::CheckedSignedMul | Opcode::CheckedUnsignedMul => {
            lhs.wrapping_mul(rhs)
        }
        Opcode::IntDiv if rhs != 0 => lhs.wrapping_div(rhs),
        Opcode::IntMod if rhs != 0 => lhs.wrapping_rem(rhs),
        Opcode::BitAnd => lhs & rhs,
        Opcode::BitOr => lhs | rhs,
        Opcode::BitXor => lhs ^ rhs,
        Opcode::ShiftLeft => ((lhs as u64).wrapping_shl(rhs as u32)) as i64,
        Opcode::ShiftRight => ((lhs as u64).wrapping_shr(rhs as u32)) as i64,
        Opcode::ArithShiftRight => lhs.wrapping_shr(rhs as u32),
        _ => return None,
    })
}

fn fold_int_unary(opcode: Opcode, operand: i64) -> Option<i64> {
    Some(match opcode {
        Opcode::IntNeg => operand.wrapping_neg(),
        Opcode::BitNot => !operand,
        Opcode::BoolNot => i64::from(operand == 0),
        _ => return None,
    })
}

fn fold_float_binary(opcode: Opcode, lhs: f64, rhs: f64) -> Option<f64> {
    Some(match opcode {
        Opcode::FloatAdd => lhs + rhs,
        Opcode::FloatSub => lhs - rhs,
        Opcode::FloatMul => lhs * rhs,
        Opcode::FloatDiv => lhs / rhs,
        _ => return None,
    })
}

impl Pass for ConstantFold {
    fn name(&self) -> &'static str {
        "constant-fold"
    }

    fn apply(&self, container: &mut Container, _config: &PipelineConfig) -> Result<bool> {
        let mut changed = false;
        let insts: Vec<_> = container.all_instructions().collect();
        for inst in insts {
            if container.is_removed(inst)? {
                continue;
            }
            let data = container.instruction(inst)?.clone();

            if data.operands.len() == 2 {
                if let (Some(lhs), Some(rhs)) = (
                    const_int(container, data.operands[0]),
                    const_int(container, data.operands[1]),
                ) {
                    if let Some(result) = fold_int_binary(data.opcode, lhs, rhs) {
                        container.replace_instruction_in_place(
                            inst,
                            Opcode::ConstInt,
                            OperandList::new(),
                            Param::Int(result),
                        )?;
                        changed = true;
                        continue;
                    }
                }
                if let (Some(lhs), Some(rhs)) = (
                    const_f64(container, data.operands[0]),
                    const_f64(container, data.operands[1]),
                ) {
                    if let Some(result) = fold_float_binary(data.opcode, lhs, rhs) {
                        container.replace_instruction_in_place(
                            inst,
                            Opcode::ConstF64,
                            OperandList::new(),
                            Param::F64(result),
                        )?;
                        changed = true;
                        continue;
                    }
                }
            } else if data.operands.len() == 1 {
                if let Some(operand) = const_int(container, data.operands[0]) {
                    if let Some(result) = fold_int_unary(data.opcode, operand) {
                        container.replace_instruction_in_place(
                            inst,
                            Opcode::ConstInt,
                            OperandList::new(),
                            Param::Int(result),
                        )?;
                        changed = true;
                        continue;
                    }
                }
                if data.opcode == Opcode::FloatNeg {
                    if let Some(operand) = const_f64(container, data.operands[0]) {
                        container.replace_instruction_in_place(
                            inst,
                            Opcode::ConstF64,
                            OperandList::new(),
                            Param::F64(-operand),
                        )?;
                        changed = true;
                    }
                }
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_ir::opcode::OperandList as Ops;

    fn push2(a: Value, b: Value) -> Ops<Value> {
        let mut ops = Ops::new();
        ops.push(a);
        ops.push(b);
        ops
    }

    #[test]
    fn folds_integer_add() {
        let mut c = Container::new();
        let block = c.new_block();
        let a = c
            .append_instruction(block, Opcode::ConstInt, Ops::new(), Param::Int(3))
            .unwrap();
        let b = c
            .append_instruction(block, Opcode::ConstInt, Ops::new(), Param::Int(4))
            .unwrap();
        let add = c
            .append_instruction(block, Opcode::IntAdd, push2(a, b), Param::None)
            .unwrap();

        let changed = ConstantFold.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert!(changed);
        let folded = c.instruction(add).unwrap();
        assert_eq!(folded.opcode, Opcode::ConstInt);
        assert_eq!(folded.param, Param::Int(7));
    }

    #[test]
    fn leaves_non_constant_operands_alone() {
        let mut c = Container::new();
        let block = c.new_block();
        let a = c
            .append_instruction(block, Opcode::ConstInt, Ops::new(), Param::Int(3))
            .unwrap();
        let param = c
            .append_instruction(block, Opcode::Load, Ops::new(), Param::None)
            .unwrap();
        let add = c
            .append_instruction(block, Opcode::IntAdd, push2(a, param), Param::None)
            .unwrap();

        let changed = ConstantFold.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert!(!changed);
        assert_eq!(c.instruction(add).unwrap().opcode, Opcode::IntAdd);
    }

    #[test]
    fn division_by_zero_is_left_unfolded() {
        let mut c = Container::new();
        let block = c.new_block();
        let a = c
            .append_instruction(block, Opcode::ConstInt, Ops::new(), Param::Int(3))
            .unwrap();
        let zero = c
            .append_instruction(block, Opcode::ConstInt, Ops::new(), Param::Int(0))
            .unwrap();
        let div = c
            .append_instruction(block, Opcode::IntDiv, push2(a, zero), Param::None)
            .unwrap();

        ConstantFold.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert_eq!(c.instruction(div).unwrap().opcode, Opcode::IntDiv);
    }
}
