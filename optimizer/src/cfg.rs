//! The control flow graph: predecessor/successor edges between blocks, and the dominator tree
//! built over them. Recomputed wholesale before each pass that needs it; nothing here is kept
//! incrementally consistent with container edits.

use crate::container::Container;
use crate::entities::Block;
use ssacc_entity::SecondaryMap;

#[derive(Clone, Default)]
struct CfgNode {
    predecessors: Vec<Block>,
    successors: Vec<Block>,
}

/// Predecessor and successor edges between a function's blocks, derived from its terminators.
pub struct ControlFlowGraph {
    data: SecondaryMap<Block, CfgNode>,
    block_count: usize,
}

impl ControlFlowGraph {
    /// Compute the control flow graph of every block currently in `container`.
    pub fn compute(container: &Container) -> ssacc_ir::error::Result<Self> {
        let mut data: SecondaryMap<Block, CfgNode> = SecondaryMap::new();
        let mut block_count = 0;
        for block in container.blocks() {
            block_count += 1;
            for succ in container.successors(block)? {
                data[block].successors.push(succ);
                data[succ].predecessors.push(block);
            }
        }
        Ok(ControlFlowGraph { data, block_count })
    }

    /// The blocks that branch directly to `block`.
    pub fn predecessors(&self, block: Block) -> &[Block] {
        &self.data[block].predecessors
    }

    /// The blocks `block`'s terminator can transfer control to.
    pub fn successors(&self, block: Block) -> &[Block] {
        &self.data[block].successors
    }

    /// Blocks reachable from `entry`, including `entry` itself.
    pub fn reachable_from(&self, entry: Block) -> std::collections::HashSet<Block> {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![entry];
        seen.insert(entry);
        while let Some(block) = stack.pop() {
            for &succ in self.successors(block) {
                if seen.insert(succ) {
                    stack.push(succ);
                }
            }
        }
        seen
    }

    /// The dominator tree rooted at `entry`, computed over exactly the blocks reachable from it.
    pub fn dominators(&self, entry: Block) -> Dominators {
        Dominators::compute(self, entry, self.block_count)
    }
}

/// Immediate-dominator tree, computed with the standard iterative Cooper-Harvey-Kennedy
/// algorithm over a reverse-postorder block numbering.
pub struct Dominators {
    /// Reverse postorder, used both to drive the fixpoint iteration and to expose `rpo_index`.
    rpo: Vec<Block>,
    rpo_index: SecondaryMap<Block, Option<usize>>,
    idom: SecondaryMap<Block, Option<usize>>,
}

impl Dominators {
    fn compute(cfg: &ControlFlowGraph, entry: Block, block_count: usize) -> Self {
        let mut rpo = Vec::with_capacity(block_count);
        let mut visited = std::collections::HashSet::new();
        Self::postorder(cfg, entry, &mut visited, &mut rpo);
        rpo.reverse();

        let mut rpo_index: SecondaryMap<Block, Option<usize>> = SecondaryMap::new();
        for (i, &block) in rpo.iter().enumerate() {
            rpo_index[block] = Some(i);
        }

        let mut idom: SecondaryMap<Block, Option<usize>> = SecondaryMap::new();
        idom[entry] = Some(rpo_index[entry].unwrap());

        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter() {
                if block == entry {
                    continue;
                }
                let mut new_idom: Option<usize> = None;
                for &pred in cfg.predecessors(block) {
                    let Some(pred_rpo) = rpo_index[pred] else {
                        continue;
                    };
                    if idom[pred].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred_rpo,
                        Some(cur) => Self::intersect(&idom, &rpo_index, &rpo, cur, pred_rpo),
                    });
                }
                if new_idom.is_some() && new_idom != idom[block] {
                    idom[block] = new_idom;
                    changed = true;
                }
            }
        }

        Dominators {
            rpo,
            rpo_index,
            idom,
        }
    }

    fn postorder(
        cfg: &ControlFlowGraph,
        block: Block,
        visited: &mut std::collections::HashSet<Block>,
        out: &mut Vec<Block>,
    ) {
        if !visited.insert(block) {
            return;
        }
        for &succ in cfg.successors(block) {
            Self::postorder(cfg, succ, visited, out);
        }
        out.push(block);
    }

    fn intersect(
        idom: &SecondaryMap<Block, Option<usize>>,
        rpo_index: &SecondaryMap<Block, Option<usize>>,
        rpo: &[Block],
        mut a: usize,
        mut b: usize,
    ) -> usize {
        while a != b {
            while a > b {
                a = idom[rpo[a]].expect("walked past a block with a recorded dominator");
            }
            while b > a {
                b = idom[rpo[b]].expect("walked past a block with a recorded dominator");
            }
        }
        a
    }

    /// `true` if `a` dominates `b` (every path from the entry to `b` passes through `a`). A block
    /// dominates itself. Unreachable blocks are dominated by nothing and dominate nothing.
    pub fn dominates(&self, a: Block, b: Block) -> bool {
        let (Some(mut bi), Some(ai)) = (self.rpo_index[b], self.rpo_index[a]) else {
            return false;
        };
        loop {
            if bi == ai {
                return true;
            }
            let Some(idom) = self.idom[self.rpo[bi]] else {
                return false;
            };
            if idom == bi {
                return false;
            }
            bi = idom;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_ir::opcode::{OperandList, Param};
    use ssacc_ir::Opcode;

    #[test]
    fn diamond_join_is_dominated_by_entry_not_either_branch() {
        let mut c = Container::new();
        let entry = c.new_block();
        let left = c.new_block();
        let right = c.new_block();
        let join = c.new_block();

        let cond = c
            .append_instruction(entry, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        c.append_branch(entry, cond, left, right).unwrap();
        c.append_jump(left, join).unwrap();
        c.append_jump(right, join).unwrap();
        c.append_instruction(join, Opcode::Return, OperandList::new(), Param::None)
            .unwrap();

        let cfg = ControlFlowGraph::compute(&c).unwrap();
        let dom = cfg.dominators(entry);
        assert!(dom.dominates(entry, join));
        assert!(!dom.dominates(left, join));
        assert!(!dom.dominates(right, join));
        assert!(dom.dominates(entry, left));
    }

    #[test]
    fn unreachable_block_is_excluded() {
        let mut c = Container::new();
        let entry = c.new_block();
        let dead = c.new_block();
        c.append_instruction(entry, Opcode::Return, OperandList::new(), Param::None)
            .unwrap();
        c.append_instruction(dead, Opcode::Return, OperandList::new(), Param::None)
            .unwrap();

        let cfg = ControlFlowGraph::compute(&c).unwrap();
        assert!(!cfg.reachable_from(entry).contains(&dead));
    }
}
