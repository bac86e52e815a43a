//! Global value numbering: canonicalises commutative operations, then elects one representative
//! instruction per `(opcode, operand-ids, param)` key and rewrites every dominated duplicate's
//! uses to it.
//!
//! Value numbering is scoped by dominance rather than pure textual order: a duplicate is only
//! rewritten to an earlier occurrence if that occurrence's block dominates the duplicate's block
//! (the earlier value is guaranteed computed on every path that reaches the duplicate). Two
//! occurrences under different, non-dominating branches of the same `if` both survive as their
//! own representatives — rewriting one to the other would be wrong, since neither is guaranteed
//! to run before the other.

use super::{Pass, PipelineConfig};
use crate::cfg::ControlFlowGraph;
use crate::container::Container;
use crate::entities::{Block, Inst};
use ssacc_entity::EntityRef;
use ssacc_ir::error::Result;
use ssacc_ir::Opcode;
use std::collections::HashMap;
use std::collections::HashSet;

/// See module docs.
pub struct GlobalValueNumbering;

fn is_commutative(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::IntAdd
            | Opcode::IntMul
            | Opcode::BitAnd
            | Opcode::BitOr
            | Opcode::BitXor
            | Opcode::FloatAdd
            | Opcode::FloatMul
            | Opcode::CheckedSignedAdd
            | Opcode::CheckedUnsignedAdd
            | Opcode::CheckedSignedMul
            | Opcode::CheckedUnsignedMul
    )
}

fn canonical_key(container: &Container, inst: Inst) -> Option<String> {
    let data = container.instruction(inst).ok()?;
    if data.opcode.has_side_effect() {
        return None;
    }
    if matches!(data.opcode, Opcode::AllocLocal | Opcode::Load | Opcode::Phi) {
        return None;
    }
    let mut operand_ids: Vec<usize> = data.operands.iter().map(|v| v.index()).collect();
    if is_commutative(data.opcode) {
        operand_ids.sort_unstable();
    }
    Some(format!("{:?}|{:?}|{:?}", data.opcode, operand_ids, data.param))
}

fn postorder(cfg: &ControlFlowGraph, block: Block, visited: &mut HashSet<Block>, out: &mut Vec<Block>) {
    if !visited.insert(block) {
        return;
    }
    for &succ in cfg.successors(block) {
        postorder(cfg, succ, visited, out);
    }
    out.push(block);
}

impl Pass for GlobalValueNumbering {
    fn name(&self) -> &'static str {
        "gvn"
    }

    fn apply(&self, container: &mut Container, _config: &PipelineConfig) -> Result<bool> {
        if container.block_count() == 0 {
            return Ok(false);
        }
        let entry = Block::new(0);
        let cfg = ControlFlowGraph::compute(container)?;
        let dominators = cfg.dominators(entry);

        let mut rpo = Vec::new();
        let mut visited = HashSet::new();
        postorder(&cfg, entry, &mut visited, &mut rpo);
        rpo.reverse();

        let mut table: HashMap<String, Vec<(Block, Inst)>> = HashMap::new();
        let mut changed = false;

        for block in rpo {
            let candidates: Vec<Inst> = container.block_instructions(block)?.to_vec();
            for inst in candidates {
                if container.is_removed(inst)? {
                    continue;
                }
                let Some(key) = canonical_key(container, inst) else {
                    continue;
                };
                let entries = table.entry(key.clone()).or_default();
                if let Some(&(def_block, rep)) = entries
                    .iter()
                    .find(|&&(def_block, _)| dominators.dominates(def_block, block))
                {
                    if rep != inst {
                        container.replace_uses(inst, rep)?;
                        if container.use_count(inst) == 0 && !container.is_removed(inst)? {
                            container.drop_instruction(inst)?;
                        }
                        changed = true;
                        continue;
                    }
                }
                entries.push((block, inst));
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_ir::opcode::{OperandList as Ops, Param};

    #[test]
    fn dominated_duplicate_is_rewritten() {
        let mut c = Container::new();
        let entry = c.new_block();
        let body = c.new_block();

        let a = c
            .append_instruction(entry, Opcode::ConstInt, Ops::new(), Param::Int(1))
            .unwrap();
        let b = c
            .append_instruction(entry, Opcode::ConstInt, Ops::new(), Param::Int(2))
            .unwrap();
        let mut ops = Ops::new();
        ops.push(a);
        ops.push(b);
        let first = c
            .append_instruction(entry, Opcode::IntAdd, ops.clone(), Param::None)
            .unwrap();
        c.append_jump(entry, body).unwrap();

        let second = c
            .append_instruction(body, Opcode::IntAdd, ops, Param::None)
            .unwrap();
        let mut ret = Ops::new();
        ret.push(second);
        c.append_instruction(body, Opcode::Return, ret, Param::None)
            .unwrap();

        let changed = GlobalValueNumbering
            .apply(&mut c, &PipelineConfig::default())
            .unwrap();
        assert!(changed);
        assert!(c.is_removed(second).unwrap());
        assert_eq!(c.use_count(first), 1);
    }

    #[test]
    fn commutative_operand_order_does_not_matter() {
        let mut c = Container::new();
        let entry = c.new_block();
        let a = c
            .append_instruction(entry, Opcode::ConstInt, Ops::new(), Param::Int(1))
            .unwrap();
        let b = c
            .append_instruction(entry, Opcode::ConstInt, Ops::new(), Param::Int(2))
            .unwrap();
        let mut ops_ab = Ops::new();
        ops_ab.push(a);
        ops_ab.push(b);
        let mut ops_ba = Ops::new();
        ops_ba.push(b);
        ops_ba.push(a);
        let first = c
            .append_instruction(entry, Opcode::IntAdd, ops_ab, Param::None)
            .unwrap();
        let second = c
            .append_instruction(entry, Opcode::IntAdd, ops_ba, Param::None)
            .unwrap();
        c.append_instruction(entry, Opcode::Return, Ops::new(), Param::None)
            .unwrap();

        GlobalValueNumbering
            .apply(&mut c, &PipelineConfig::default())
            .unwrap();
        assert!(c.is_removed(second).unwrap());
        let _ = first;
    }

    #[test]
    fn non_dominating_sibling_branches_both_survive() {
        let mut c = Container::new();
        let entry = c.new_block();
        let left = c.new_block();
        let right = c.new_block();
        let join = c.new_block();

        let cond = c
            .append_instruction(entry, Opcode::ConstInt, Ops::new(), Param::Int(1))
            .unwrap();
        c.append_branch(entry, cond, left, right).unwrap();

        let a = c
            .append_instruction(left, Opcode::ConstInt, Ops::new(), Param::Int(5))
            .unwrap();
        let b = c
            .append_instruction(left, Opcode::ConstInt, Ops::new(), Param::Int(6))
            .unwrap();
        let mut ops1 = Ops::new();
        ops1.push(a);
        ops1.push(b);
        let left_add = c
            .append_instruction(left, Opcode::IntAdd, ops1, Param::None)
            .unwrap();
        c.append_jump(left, join).unwrap();

        let a2 = c
            .append_instruction(right, Opcode::ConstInt, Ops::new(), Param::Int(5))
            .unwrap();
        let b2 = c
            .append_instruction(right, Opcode::ConstInt, Ops::new(), Param::Int(6))
            .unwrap();
        let mut ops2 = Ops::new();
        ops2.push(a2);
        ops2.push(b2);
        let right_add = c
            .append_instruction(right, Opcode::IntAdd, ops2, Param::None)
            .unwrap();
        c.append_jump(right, join).unwrap();

        let phi = c.add_phi(join).unwrap();
        c.phi_set_input(phi, left, left_add).unwrap();
        c.phi_set_input(phi, right, right_add).unwrap();
        let mut ret = Ops::new();
        ret.push(phi);
        c.append_instruction(join, Opcode::Return, ret, Param::None)
            .unwrap();

        GlobalValueNumbering
            .apply(&mut c, &PipelineConfig::default())
            .unwrap();
        assert!(!c.is_removed(left_add).unwrap());
        assert!(!c.is_removed(right_add).unwrap());
    }
}
