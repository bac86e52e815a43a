//! Marks a syntactically-last `invoke` in a function as tail-callable.
//!
//! A call sits in tail position when it is the sole operand of its block's `return` and nothing
//! else in the block reads its result. The marker is a separate instruction rather than a flag on
//! `invoke` itself (see [`ssacc_ir::Opcode::TailCallMarker`]) so the shape survives
//! `replace-instruction-in-place` rewrites of the invoke the way any other user would.
//!
//! This pass does not attempt to prove calling-convention compatibility (the source and target
//! functions share one convention in this backend, so there is nothing to check); the one
//! correctness condition it does enforce is the "no outstanding local-variable escapes" clause:
//! a surviving `alloc-local` anywhere in the function means some local's address may still be
//! read back after the call returns, which a tail jump would clobber by reusing the frame before
//! the callee runs. Dead-alloc runs ahead of this pass in the default pipeline, so a surviving
//! alloc here is one actually referenced by something, not just the common case needing cleanup.

use super::{Pass, PipelineConfig};
use crate::container::Container;
use ssacc_ir::error::Result;
use ssacc_ir::opcode::{OperandList, Param};
use ssacc_ir::Opcode;

/// See module docs.
pub struct TailCall;

impl Pass for TailCall {
    fn name(&self) -> &'static str {
        "tail-call"
    }

    fn apply(&self, container: &mut Container, _config: &PipelineConfig) -> Result<bool> {
        let has_local_escape = container
            .all_instructions()
            .filter(|&inst| !container.is_removed(inst).unwrap_or(true))
            .any(|inst| {
                container
                    .instruction(inst)
                    .map(|data| data.opcode == Opcode::AllocLocal)
                    .unwrap_or(false)
            });
        if has_local_escape {
            return Ok(false);
        }

        let mut changed = false;
        for block in container.blocks() {
            let Some(terminator) = container.block_terminator(block)? else {
                continue;
            };
            let term_data = container.instruction(terminator)?.clone();
            if term_data.opcode != Opcode::Return || term_data.operands.len() != 1 {
                continue;
            }
            let returned = term_data.operands[0];
            let Ok(candidate) = container.instruction(returned) else {
                continue;
            };
            if candidate.opcode != Opcode::Invoke {
                continue;
            }
            if container.use_count(returned) != 1 {
                // Some other instruction also reads the call result; not tail position.
                continue;
            }
            if container.sibling(returned)? != Some(terminator) {
                // Something runs between the call and the return.
                continue;
            }
            let already_marked = container
                .block_instructions(block)?
                .iter()
                .any(|&inst| {
                    !container.is_removed(inst).unwrap_or(true)
                        && container
                            .instruction(inst)
                            .map(|d| {
                                d.opcode == Opcode::TailCallMarker && d.operands.first() == Some(&returned)
                            })
                            .unwrap_or(false)
                });
            if already_marked {
                continue;
            }

            let mut operands = OperandList::new();
            operands.push(returned);
            container.insert_before(
                block,
                terminator,
                Opcode::TailCallMarker,
                operands,
                Param::None,
            )?;
            changed = true;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_ir::opcode::OperandList as Ops;
    use ssacc_ir::{EntityRef, StringId};

    fn sym(id: u32) -> Param {
        Param::Symbol(StringId::new(id as usize))
    }

    #[test]
    fn marks_call_immediately_preceding_return() {
        let mut c = Container::new();
        let block = c.new_block();
        let call = c
            .append_instruction(block, Opcode::Invoke, Ops::new(), sym(0))
            .unwrap();
        let mut ret_ops = Ops::new();
        ret_ops.push(call);
        c.append_instruction(block, Opcode::Return, ret_ops, Param::None)
            .unwrap();

        let changed = TailCall.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert!(changed);
        let marker = c.block_instructions(block).unwrap()[1];
        assert_eq!(c.instruction(marker).unwrap().opcode, Opcode::TailCallMarker);
        assert_eq!(c.instruction(marker).unwrap().operands[0], call);
    }

    #[test]
    fn call_with_extra_use_is_not_tail() {
        let mut c = Container::new();
        let block = c.new_block();
        let call = c
            .append_instruction(block, Opcode::Invoke, Ops::new(), sym(0))
            .unwrap();
        let mut add_ops = Ops::new();
        add_ops.push(call);
        add_ops.push(call);
        c.append_instruction(block, Opcode::IntAdd, add_ops, Param::None)
            .unwrap();
        let mut ret_ops = Ops::new();
        ret_ops.push(call);
        c.append_instruction(block, Opcode::Return, ret_ops, Param::None)
            .unwrap();

        let changed = TailCall.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert!(!changed);
    }

    #[test]
    fn surviving_alloc_local_disqualifies_the_whole_function() {
        let mut c = Container::new();
        let block = c.new_block();
        c.append_instruction(block, Opcode::AllocLocal, Ops::new(), Param::None)
            .unwrap();
        let call = c
            .append_instruction(block, Opcode::Invoke, Ops::new(), sym(0))
            .unwrap();
        let mut ret_ops = Ops::new();
        ret_ops.push(call);
        c.append_instruction(block, Opcode::Return, ret_ops, Param::None)
            .unwrap();

        let changed = TailCall.apply(&mut c, &PipelineConfig::default()).unwrap();
        assert!(!changed);
    }
}
