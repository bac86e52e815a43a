//! Collapses the diamond shape the front end emits for `&&`/`||` into straight-line boolean
//! arithmetic.
//!
//! Short-circuit evaluation lowers to a branch on the left operand, a block that computes the
//! right operand only when reached, and a join block whose phi selects between the right
//! operand's value and a constant `0` (for `&&`) or `1` (for `||`). When both non-join blocks in
//! the diamond are otherwise empty (so evaluating the right operand has no side effect the branch
//! was there to guard), the phi's value is exactly `left & right` or `left | right` and the
//! branch can be bypassed for that value. The branch and its blocks are left in place — removing
//! them is dead-code elimination's job once the phi's last use is gone — this pass only stops
//! routing the *value* through the diamond.

use super::{Pass, PipelineConfig};
use crate::container::Container;
use crate::entities::{Block, Inst, Value};
use ssacc_entity::EntityRef;
use ssacc_ir::error::Result;
use ssacc_ir::opcode::{OperandList, Param};
use ssacc_ir::Opcode;

/// See module docs.
pub struct BoolSimplify;

fn const_bool(container: &Container, value: Value) -> Option<i64> {
    let data = container.instruction(value).ok()?;
    match (data.opcode, &data.param) {
        (Opcode::ConstInt, Param::Int(n)) if *n == 0 || *n == 1 => Some(*n),
        _ => None,
    }
}

/// `true` if `block` does nothing but jump straight to `target` (no phis, no other instructions).
fn is_trivial_jump_to(container: &Container, block: Block, target: Block) -> Result<bool> {
    if !container.block_phis(block)?.is_empty() {
        return Ok(false);
    }
    let instructions = container.block_instructions(block)?;
    if instructions.len() != 1 {
        return Ok(false);
    }
    let data = container.instruction(instructions[0])?;
    Ok(matches!((data.opcode, &data.param), (Opcode::Jump, Param::Block(b)) if Block::new(*b as usize) == target))
}

fn find_branch_to(container: &Container, a: Block, b: Block) -> Result<Option<(Block, Value)>> {
    for block in container.blocks() {
        let Some(term) = container.block_terminator(block)? else {
            continue;
        };
        let data = container.instruction(term)?;
        if let (Opcode::Branch, Param::BlockPair(t, f)) = (data.opcode, &data.param) {
            let (t, f) = (Block::new(*t as usize), Block::new(*f as usize));
            if (t == a && f == b) || (t == b && f == a) {
                return Ok(Some((block, data.operands[0])));
            }
        }
    }
    Ok(None)
}

impl Pass for BoolSimplify {
    fn name(&self) -> &'static str {
        "bool-simplify"
    }

    fn apply(&self, container: &mut Container, _config: &PipelineConfig) -> Result<bool> {
        let mut changed = false;
        for join in container.blocks() {
            let phis: Vec<Inst> = container.block_phis(join)?.to_vec();
            if phis.len() != 1 {
                continue;
            }
            let phi = phis[0];
            let inputs = container.phi_inputs(phi).to_vec();
            if inputs.len() != 2 {
                continue;
            }
            let ((p0, v0), (p1, v1)) = (inputs[0], inputs[1]);

            let (const_side, value_side) = if let Some(c) = const_bool(container, v0) {
                ((p0, c), (p1, v1))
            } else if let Some(c) = const_bool(container, v1) {
                ((p1, c), (p0, v0))
            } else {
                continue;
            };
            let (const_pred, const_val) = const_side;
            let (value_pred, value_val) = value_side;
            if value_pred == const_pred {
                continue;
            }
            if !is_trivial_jump_to(container, const_pred, join)?
                || !is_trivial_jump_to(container, value_pred, join)?
            {
                continue;
            }
            let Some((branch_block, cond)) = find_branch_to(container, const_pred, value_pred)?
            else {
                continue;
            };
            let branch_term = container.block_terminator(branch_block)?.unwrap();
            let branch_data = container.instruction(branch_term)?;
            let Param::BlockPair(t, _) = branch_data.param else {
                continue;
            };
            let true_target = Block::new(t as usize);

            // `&&`: cond false routes to the 0 side, cond true routes to the evaluated side.
            // `||`: cond true routes to the 1 side, cond false routes to the evaluated side.
            let opcode = if const_val == 0 && true_target == value_pred {
                Opcode::BitAnd
            } else if const_val == 1 && true_target == const_pred {
                Opcode::BitOr
            } else {
                continue;
            };

            let mut operands = OperandList::new();
            operands.push(cond);
            operands.push(value_val);
            let collapsed =
                container.insert_before(branch_block, branch_term, opcode, operands, Param::None)?;
            container.replace_uses(phi, collapsed)?;
            container.drop_instruction(phi)?;
            changed = true;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_ir::opcode::OperandList as Ops;

    /// Builds the canonical `&&` diamond: `entry` branches on `cond` to `rhs` (which computes
    /// `rhs_val` and jumps to `join`) or `zero` (which jumps straight to `join`); `join`'s phi
    /// picks `rhs_val` or the constant `0`.
    fn build_and_diamond() -> (Container, Value, Value, Inst) {
        let mut c = Container::new();
        let entry = c.new_block();
        let rhs = c.new_block();
        let zero_block = c.new_block();
        let join = c.new_block();

        let cond = c
            .append_instruction(entry, Opcode::IntCompareSigned, Ops::new(), Param::None)
            .unwrap();
        c.append_branch(entry, cond, rhs, zero_block).unwrap();

        let rhs_val = c
            .append_instruction(rhs, Opcode::IntCompareSigned, Ops::new(), Param::None)
            .unwrap();
        c.append_jump(rhs, join).unwrap();

        let zero = c
            .append_instruction(zero_block, Opcode::ConstInt, Ops::new(), Param::Int(0))
            .unwrap();
        c.append_jump(zero_block, join).unwrap();

        let phi = c.add_phi(join).unwrap();
        c.phi_set_input(phi, rhs, rhs_val).unwrap();
        c.phi_set_input(phi, zero_block, zero).unwrap();
        c.append_instruction(join, Opcode::Return, {
            let mut ops = Ops::new();
            ops.push(phi);
            ops
        }, Param::None)
        .unwrap();

        (c, cond, rhs_val, phi)
    }

    #[test]
    fn collapses_and_diamond_to_bitwise_and() {
        let (mut c, cond, rhs_val, phi) = build_and_diamond();
        let changed = BoolSimplify.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert!(changed);
        assert!(c.is_removed(phi).unwrap());
        assert_eq!(c.use_count(cond), 1);
        assert_eq!(c.use_count(rhs_val), 1);
    }

    #[test]
    fn non_boolean_diamond_is_left_alone() {
        let mut c = Container::new();
        let entry = c.new_block();
        let left = c.new_block();
        let right = c.new_block();
        let join = c.new_block();
        let cond = c
            .append_instruction(entry, Opcode::IntCompareSigned, Ops::new(), Param::None)
            .unwrap();
        c.append_branch(entry, cond, left, right).unwrap();
        let a = c
            .append_instruction(left, Opcode::ConstInt, Ops::new(), Param::Int(5))
            .unwrap();
        c.append_jump(left, join).unwrap();
        let b = c
            .append_instruction(right, Opcode::ConstInt, Ops::new(), Param::Int(9))
            .unwrap();
        c.append_jump(right, join).unwrap();
        let phi = c.add_phi(join).unwrap();
        c.phi_set_input(phi, left, a).unwrap();
        c.phi_set_input(phi, right, b).unwrap();

        let changed = BoolSimplify.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert!(!changed);
    }
}
