//! Replaces arithmetic by an algebraic identity or a cheaper equivalent operation when one
//! operand is a known constant.
//!
//! Division and modulo by a power of two are deliberately not reduced here: this IR's
//! `int-div`/`int-mod` opcodes carry no signedness tag on the instruction itself (see
//! `ssacc-ir::opcode`), and the unsigned-only shift/mask rewrite the source format calls for would
//! be unsound applied to a signed division. A width- and signedness-typed extension of the
//! instruction format would be needed to reduce this safely; until then the codegen driver's
//! pattern selector lowers `int-div` directly.

use super::{Pass, PipelineConfig};
use crate::container::Container;
use crate::entities::{Inst, Value};
use ssacc_ir::error::Result;
use ssacc_ir::opcode::{OperandList, Param};
use ssacc_ir::Opcode;

/// See module docs.
pub struct StrengthReduce;

fn const_int(container: &Container, value: Value) -> Option<i64> {
    let data = container.instruction(value).ok()?;
    match (data.opcode, &data.param) {
        (Opcode::ConstInt, Param::Int(n)) => Some(*n),
        _ => None,
    }
}

fn power_of_two_shift(n: i64) -> Option<u32> {
    if n > 0 && (n as u64).is_power_of_two() {
        Some((n as u64).trailing_zeros())
    } else {
        None
    }
}

fn two_operands(a: Value, b: Value) -> OperandList<Value> {
    let mut ops = OperandList::new();
    ops.push(a);
    ops.push(b);
    ops
}

/// Replace `inst`'s uses with `value` and drop `inst`, keeping `value`'s id but freeing `inst`'s.
fn replace_with(container: &mut Container, inst: Inst, value: Value) -> Result<()> {
    container.replace_uses(inst, value)?;
    container.drop_instruction(inst)
}

impl Pass for StrengthReduce {
    fn name(&self) -> &'static str {
        "strength-reduce"
    }

    fn apply(&self, container: &mut Container, _config: &PipelineConfig) -> Result<bool> {
        let mut changed = false;
        let insts: Vec<_> = container.all_instructions().collect();
        for inst in insts {
            if container.is_removed(inst)? {
                continue;
            }
            let data = container.instruction(inst)?.clone();
            if data.operands.len() != 2 {
                continue;
            }
            let lhs = data.operands[0];
            let rhs = data.operands[1];
            let lhs_const = const_int(container, lhs);
            let rhs_const = const_int(container, rhs);
            let block = container.instruction_block(inst)?;

            match data.opcode {
                Opcode::IntAdd | Opcode::BitXor if rhs_const == Some(0) => {
                    replace_with(container, inst, lhs)?;
                    changed = true;
                }
                Opcode::IntAdd if lhs_const == Some(0) => {
                    replace_with(container, inst, rhs)?;
                    changed = true;
                }
                Opcode::IntSub if rhs_const == Some(0) => {
                    replace_with(container, inst, lhs)?;
                    changed = true;
                }
                Opcode::BitOr if rhs_const == Some(0) => {
                    replace_with(container, inst, lhs)?;
                    changed = true;
                }
                Opcode::BitOr if lhs_const == Some(0) => {
                    replace_with(container, inst, rhs)?;
                    changed = true;
                }
                Opcode::BitAnd if rhs_const == Some(-1) => {
                    replace_with(container, inst, lhs)?;
                    changed = true;
                }
                Opcode::BitAnd if lhs_const == Some(-1) => {
                    replace_with(container, inst, rhs)?;
                    changed = true;
                }
                Opcode::BitAnd if rhs_const == Some(0) || lhs_const == Some(0) => {
                    container.replace_instruction_in_place(
                        inst,
                        Opcode::ConstInt,
                        OperandList::new(),
                        Param::Int(0),
                    )?;
                    changed = true;
                }
                Opcode::IntMul if rhs_const == Some(1) => {
                    replace_with(container, inst, lhs)?;
                    changed = true;
                }
                Opcode::IntMul if lhs_const == Some(1) => {
                    replace_with(container, inst, rhs)?;
                    changed = true;
                }
                Opcode::IntMul if rhs_const == Some(0) || lhs_const == Some(0) => {
                    container.replace_instruction_in_place(
                        inst,
                        Opcode::ConstInt,
                        OperandList::new(),
                        Param::Int(0),
                    )?;
                    changed = true;
                }
                Opcode::ShiftLeft | Opcode::ShiftRight | Opcode::ArithShiftRight
                    if rhs_const == Some(0) =>
                {
                    replace_with(container, inst, lhs)?;
                    changed = true;
                }
                Opcode::IntMul => {
                    let (value, constant) = match (lhs_const, rhs_const) {
                        (_, Some(c)) => (lhs, c),
                        (Some(c), _) => (rhs, c),
                        _ => continue,
                    };
                    if let Some(shift) = power_of_two_shift(constant) {
                        let amount = container.insert_before(
                            block,
                            inst,
                            Opcode::ConstInt,
                            OperandList::new(),
                            Param::Int(shift as i64),
                        )?;
                        container.replace_instruction_in_place(
                            inst,
                            Opcode::ShiftLeft,
                            two_operands(value, amount),
                            Param::None,
                        )?;
                        changed = true;
                    }
                }
                _ => {}
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
    fn multiply_by_power_of_two_becomes_shift() {
        let mut c = Container::new();
        let block = c.new_block();
        let x = c
            .append_instruction(block, Opcode::Load, Ops::new(), Param::None)
            .unwrap();
        let eight = c
            .append_instruction(block, Opcode::ConstInt, Ops::new(), Param::Int(8))
            .unwrap();
        let mul = c
            .append_instruction(block, Opcode::IntMul, push2(x, eight), Param::None)
            .unwrap();

        StrengthReduce
            .apply(&mut c, &PipelineConfig::default())
            .unwrap();
        let result = c.instruction(mul).unwrap();
        assert_eq!(result.opcode, Opcode::ShiftLeft);
        assert_eq!(result.operands[0], x);
        let shift_amount = c.instruction(result.operands[1]).unwrap();
        assert_eq!(shift_amount.param, Param::Int(3));
    }

    #[test]
    fn add_zero_is_removed() {
        let mut c = Container::new();
        let block = c.new_block();
        let x = c
            .append_instruction(block, Opcode::Load, Ops::new(), Param::None)
            .unwrap();
        let zero = c
            .append_instruction(block, Opcode::ConstInt, Ops::new(), Param::Int(0))
            .unwrap();
        let add = c
            .append_instruction(block, Opcode::IntAdd, push2(x, zero), Param::None)
            .unwrap();
        let user = c
            .append_instruction(block, Opcode::IntNeg, push2(add, add), Param::None)
            .unwrap();
        let _ = user;

        StrengthReduce
            .apply(&mut c, &PipelineConfig::default())
            .unwrap();
        assert!(c.is_removed(add).unwrap());
    }

    #[test]
    fn and_with_zero_folds_to_zero() {
        let mut c = Container::new();
        let block = c.new_block();
        let x = c
            .append_instruction(block, Opcode::Load, Ops::new(), Param::None)
            .unwrap();
        let zero = c
            .append_instruction(block, Opcode::ConstInt, Ops::new(), Param::Int(0))
            .unwrap();
        let and = c
            .append_instruction(block, Opcode::BitAnd, push2(x, zero), Param::None)
            .unwrap();

        StrengthReduce
            .apply(&mut c, &PipelineConfig::default())
            .unwrap();
        let result = c.instruction(and).unwrap();
        assert_eq!(result.opcode, Opcode::ConstInt);
        assert_eq!(result.param, Param::Int(0));
    }
}
