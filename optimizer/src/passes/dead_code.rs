//! Reachable-block trimming plus ordinary dead-instruction elimination, run together to a
//! fixpoint: removing a block can zero out the use count of values only it consumed, and removing
//! a use can turn a block's sole remaining predecessor edge into dead code in turn.

use super::{Pass, PipelineConfig};
use crate::cfg::ControlFlowGraph;
use crate::container::Container;
use crate::entities::{Block, Inst};
use ssacc_entity::EntityRef;
use ssacc_ir::error::Result;

/// See module docs. The function's entry block is taken to be block `0`, the first block any
/// caller creates with [`Container::new_block`].
pub struct DeadCode;

impl DeadCode {
    fn drain_zero_use_block(container: &mut Container, block: Block) -> Result<bool> {
        let mut changed = false;
        loop {
            let candidates: Vec<Inst> = container
                .block_phis(block)?
                .iter()
                .chain(container.block_instructions(block)?.iter())
                .copied()
                .collect();
            let mut progressed = false;
            for inst in candidates {
                if container.is_removed(inst)? {
                    continue;
                }
                if container.use_count(inst) == 0 {
                    container.drop_instruction(inst)?;
                    progressed = true;
                    changed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        Ok(changed)
    }
}

impl Pass for DeadCode {
    fn name(&self) -> &'static str {
        "dead-code"
    }

    fn apply(&self, container: &mut Container, _config: &PipelineConfig) -> Result<bool> {
        let mut changed = false;
        let mut round_changed = true;
        while round_changed {
            round_changed = false;

            if container.block_count() > 0 {
                let cfg = ControlFlowGraph::compute(container)?;
                let entry = Block::new(0);
                let reachable = cfg.reachable_from(entry);
                let unreachable: Vec<Block> = container
                    .blocks()
                    .filter(|b| !reachable.contains(b))
                    .collect();
                for block in unreachable {
                    if Self::drain_zero_use_block(container, block)? {
                        round_changed = true;
                    }
                }
            }

            let all: Vec<Inst> = container.all_instructions().collect();
            for inst in all {
                if container.is_removed(inst)? {
                    continue;
                }
                let data = container.instruction(inst)?;
                if data.opcode.has_side_effect() {
                    continue;
                }
                if container.use_count(inst) == 0 {
                    container.drop_instruction(inst)?;
                    round_changed = true;
                }
            }

            if round_changed {
                changed = true;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_ir::opcode::{OperandList, Param};
    use ssacc_ir::Opcode;

    #[test]
    fn unreachable_block_and_its_definitions_are_removed() {
        let mut c = Container::new();
        let entry = c.new_block();
        let dead = c.new_block();
        c.append_instruction(entry, Opcode::Return, OperandList::new(), Param::None)
            .unwrap();
        let dead_const = c
            .append_instruction(dead, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        c.append_instruction(dead, Opcode::Return, OperandList::new(), Param::None)
            .unwrap();

        DeadCode.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert!(c.is_removed(dead_const).unwrap());
    }

    #[test]
    fn pure_value_with_no_uses_is_removed_but_side_effects_stay() {
        let mut c = Container::new();
        let entry = c.new_block();
        let dead_const = c
            .append_instruction(entry, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        let mut store_operands = OperandList::new();
        store_operands.push(dead_const);
        store_operands.push(dead_const);
        c.append_instruction(entry, Opcode::Store, store_operands, Param::None)
            .unwrap();
        c.append_instruction(entry, Opcode::Return, OperandList::new(), Param::None)
            .unwrap();

        DeadCode.apply(&mut c, &PipelineConfig::default()).unwrap();
        // dead_const is used by the store, so it survives even though nothing else reads it.
        assert!(!c.is_removed(dead_const).unwrap());
    }
}
