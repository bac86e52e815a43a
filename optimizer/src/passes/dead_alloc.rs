//! Drops a local allocation whose only users are lifetime markers: a local that is never loaded,
//! stored through, or has its address taken has no observable effect and its markers are pure
//! bookkeeping for the backend's debug-info emission, which has nothing to say about a local that
//! no longer exists.

use super::{Pass, PipelineConfig};
use crate::container::Container;
use ssacc_ir::error::Result;
use ssacc_ir::Opcode;

/// See module docs.
pub struct DeadAlloc;

impl Pass for DeadAlloc {
    fn name(&self) -> &'static str {
        "dead-alloc"
    }

    fn apply(&self, container: &mut Container, _config: &PipelineConfig) -> Result<bool> {
        let allocs: Vec<_> = container
            .all_instructions()
            .filter(|&inst| !container.is_removed(inst).unwrap_or(true))
            .filter(|&inst| {
                container
                    .instruction(inst)
                    .map(|i| i.opcode == Opcode::AllocLocal)
                    .unwrap_or(false)
            })
            .collect();

        let mut changed = false;
        for alloc in allocs {
            if container.is_removed(alloc)? {
                continue;
            }
            let users: Vec<_> = container.instr_use_iterator(alloc).collect();
            let all_markers = users.iter().all(|&user| {
                container
                    .instruction(user)
                    .map(|i| i.opcode == Opcode::LocalLifetimeMark)
                    .unwrap_or(false)
            });
            if !all_markers {
                continue;
            }
            for marker in users {
                container.drop_instruction(marker)?;
            }
            container.drop_instruction(alloc)?;
            changed = true;
        }

        debug_assert!(
            container
                .all_instructions()
                .filter(|&inst| !container.is_removed(inst).unwrap_or(true))
                .all(|inst| {
                    let data = container.instruction(inst).unwrap();
                    data.opcode != Opcode::LocalLifetimeMark
                        || container
                            .instruction(data.operands[0])
                            .map(|a| a.opcode == Opcode::AllocLocal)
                            .unwrap_or(false)
                }),
            "surviving local-lifetime-mark must still reference an alloc-local"
        );

        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use ssacc_ir::opcode::{OperandList, Param};

    fn push_op(v: crate::entities::Value) -> OperandList<crate::entities::Value> {
        let mut ops = OperandList::new();
        ops.push(v);
        ops
    }

    #[test]
    fn alloc_with_only_lifetime_markers_is_dropped() {
        let mut c = Container::new();
        let block = c.new_block();
        let alloc = c
            .append_instruction(block, Opcode::AllocLocal, OperandList::new(), Param::None)
            .unwrap();
        let begin = c
            .append_instruction(
                block,
                Opcode::LocalLifetimeMark,
                push_op(alloc),
                Param::Int(0),
            )
            .unwrap();
        let end = c
            .append_instruction(
                block,
                Opcode::LocalLifetimeMark,
                push_op(alloc),
                Param::Int(1),
            )
            .unwrap();

        let changed = DeadAlloc.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert!(changed);
        assert!(c.is_removed(alloc).unwrap());
        assert!(c.is_removed(begin).unwrap());
        assert!(c.is_removed(end).unwrap());
    }

    #[test]
    fn alloc_used_by_a_load_survives() {
        let mut c = Container::new();
        let block = c.new_block();
        let alloc = c
            .append_instruction(block, Opcode::AllocLocal, OperandList::new(), Param::None)
            .unwrap();
        c.append_instruction(block, Opcode::Load, push_op(alloc), Param::None)
            .unwrap();

        let changed = DeadAlloc.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert!(!changed);
        assert!(!c.is_removed(alloc).unwrap());
    }
}
