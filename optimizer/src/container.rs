//! The SSA code container: owns every instruction and block of one optimizer function, and keeps
//! the use-def index exact across every mutation.

use crate::entities::{Block, Inst, Value};
use ssacc_entity::{EntityRef, PrimaryMap, SecondaryMap};
use ssacc_ir::error::{self, Result};
use ssacc_ir::opcode::{Instruction, OperandList, Param};
use ssacc_ir::Opcode;
use std::collections::HashSet;

/// Receives notifications of container mutations. The debug-info tracker is the only production
/// listener: it subscribes to keep the bytecode-offset-to-instruction side table in sync when a
/// pass replaces one instruction with another. Per the documented reentrancy rule, a listener
/// must not call back into the container except through APIs explicitly marked listener-safe;
/// none of the methods here are, so a correct listener only records what happened.
pub trait Listener {
    /// Called after `inst` has been linked into its block.
    fn instruction_added(&mut self, inst: Inst) {
        let _ = inst;
    }
    /// Called after `inst` has been unlinked from its block and purged from the use-def index.
    fn instruction_removed(&mut self, inst: Inst) {
        let _ = inst;
    }
    /// Called after operand `operand_index` of `inst` changed from `old` to `new`.
    fn operand_changed(&mut self, inst: Inst, operand_index: usize, old: Value, new: Value) {
        let _ = (inst, operand_index, old, new);
    }
}

struct InstData {
    instruction: Instruction<Value>,
    block: Block,
    /// Set by [`Container::drop_instruction`]. The entry itself is never reclaimed (see
    /// [`Container::all_instructions`]), so this is how callers distinguish a live id from one
    /// that used to exist.
    removed: bool,
}

#[derive(Default)]
struct BlockData {
    /// Non-phi instructions in program order, terminator (if present) last.
    instructions: Vec<Inst>,
    /// Phi nodes, kept separate from `instructions` per the data model.
    phis: Vec<Inst>,
    terminator: Option<Inst>,
}

/// Per-phi predecessor-to-input-value bindings, keyed by the phi's own `Inst` id.
#[derive(Default, Clone)]
struct PhiInputs {
    inputs: Vec<(Block, Value)>,
}

/// One `switch` instruction's out-of-line case table.
#[derive(Clone, Debug)]
pub struct SwitchTable {
    /// `(case value, target block)` pairs.
    pub cases: Vec<(i64, Block)>,
    /// The block taken when no case value matches.
    pub default: Block,
}

/// The central SSA data structure for one optimizer function.
pub struct Container {
    blocks: PrimaryMap<Block, BlockData>,
    instructions: PrimaryMap<Inst, InstData>,
    phi_inputs: SecondaryMap<Inst, PhiInputs>,
    use_def: SecondaryMap<Inst, HashSet<Inst>>,
    switch_tables: Vec<SwitchTable>,
    listener: Option<Box<dyn Listener>>,
}

impl Default for Container {
    fn default() -> Self {
        Container {
            blocks: PrimaryMap::new(),
            instructions: PrimaryMap::new(),
            phi_inputs: SecondaryMap::new(),
            use_def: SecondaryMap::new(),
            switch_tables: Vec::new(),
            listener: None,
        }
    }
}

impl Container {
    /// An empty container with no blocks.
    pub fn new() -> Self {
        Container::default()
    }

    /// Install a listener. Replaces any previously installed listener.
    pub fn set_listener(&mut self, listener: Box<dyn Listener>) {
        self.listener = Some(listener);
    }

    /// `new-block`: create an empty block with no terminator.
    pub fn new_block(&mut self) -> Block {
        self.blocks.push(BlockData::default())
    }

    /// Number of blocks created so far (including any later removed from program order but not
    /// physically reclaimed; this container never reclaims entity ids).
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// `container-iter`: blocks in insertion order.
    pub fn blocks(&self) -> impl Iterator<Item = Block> {
        self.blocks.keys()
    }

    /// Instructions of `block` in program order, including the terminator if present but
    /// excluding phis.
    pub fn block_instructions(&self, block: Block) -> Result<&[Inst]> {
        Ok(&self.block_data(block)?.instructions)
    }

    /// Phi nodes of `block`, in insertion order.
    pub fn block_phis(&self, block: Block) -> Result<&[Inst]> {
        Ok(&self.block_data(block)?.phis)
    }

    /// The block's terminator, if one has been appended yet.
    pub fn block_terminator(&self, block: Block) -> Result<Option<Inst>> {
        Ok(self.block_data(block)?.terminator)
    }

    /// `block-instr-head`: the first non-phi instruction of `block`.
    pub fn block_instr_head(&self, block: Block) -> Result<Option<Inst>> {
        Ok(self.block_data(block)?.instructions.first().copied())
    }

    /// `block-instr-tail`: the last non-phi instruction of `block` (the terminator, if any).
    pub fn block_instr_tail(&self, block: Block) -> Result<Option<Inst>> {
        Ok(self.block_data(block)?.instructions.last().copied())
    }

    /// `sibling`: the instruction immediately following `inst` in its block's program order, or
    /// `None` at the tail. Valid across drops of `inst` itself only if fetched before the drop;
    /// the caller must not call this on an already-dropped instruction.
    pub fn sibling(&self, inst: Inst) -> Result<Option<Inst>> {
        let block = self.instruction_block(inst)?;
        let instructions = &self.block_data(block)?.instructions;
        let pos = instructions
            .iter()
            .position(|&i| i == inst)
            .ok_or_else(|| error::invalid_state("instruction not found in its own block"))?;
        Ok(instructions.get(pos + 1).copied())
    }

    fn block_data(&self, block: Block) -> Result<&BlockData> {
        self.blocks
            .get(block)
            .ok_or_else(|| error::invalid_parameter(format!("unknown block {}", block)))
    }

    fn block_data_mut(&mut self, block: Block) -> Result<&mut BlockData> {
        self.blocks
            .get_mut(block)
            .ok_or_else(|| error::invalid_parameter(format!("unknown block {}", block)))
    }

    /// The instruction's full data: opcode, operands and parameter.
    pub fn instruction(&self, inst: Inst) -> Result<&Instruction<Value>> {
        Ok(&self
            .instructions
            .get(inst)
            .ok_or_else(|| error::invalid_parameter(format!("unknown instruction {}", inst)))?
            .instruction)
    }

    /// The block `inst` currently belongs to.
    pub fn instruction_block(&self, inst: Inst) -> Result<Block> {
        Ok(self
            .instructions
            .get(inst)
            .ok_or_else(|| error::invalid_parameter(format!("unknown instruction {}", inst)))?
            .block)
    }

    fn record_uses(&mut self, user: Inst, operands: &OperandList<Value>) {
        for &operand in operands {
            self.use_def[operand].insert(user);
        }
    }

    fn forget_uses(&mut self, user: Inst, operands: &OperandList<Value>) {
        for &operand in operands {
            self.use_def[operand].remove(&user);
        }
    }

    /// `append-instruction`: append before `block`'s terminator (or at the end, if none yet).
    /// Fails with `invalid-state` if `opcode` is a terminator and `block` already has one.
    pub fn append_instruction(
        &mut self,
        block: Block,
        opcode: Opcode,
        operands: OperandList<Value>,
        param: Param,
    ) -> Result<Inst> {
        if opcode.is_terminator() && self.block_data(block)?.terminator.is_some() {
            return Err(error::invalid_state(format!(
                "block {} already has a terminator",
                block
            )));
        }
        let inst = self.instructions.push(InstData {
            instruction: Instruction {
                opcode,
                operands: operands.clone(),
                param,
            },
            block,
            removed: false,
        });
        self.record_uses(inst, &operands);

        if opcode == Opcode::Phi {
            self.block_data_mut(block)?.phis.push(inst);
        } else {
            let data = self.block_data_mut(block)?;
            data.instructions.push(inst);
            if opcode.is_terminator() {
                data.terminator = Some(inst);
            }
        }
        if let Some(listener) = self.listener.as_mut() {
            listener.instruction_added(inst);
        }
        Ok(inst)
    }

    /// Insert a new non-phi, non-terminator instruction into `block` immediately ahead of
    /// `before`, mirroring the usual cursor convention that new instructions land just before the
    /// current position. Passes use this to introduce a helper value (e.g. a shift-amount
    /// constant) that an instruction they are simplifying needs to reference without disturbing
    /// program order for any of `before`'s existing predecessors in the block.
    pub fn insert_before(
        &mut self,
        block: Block,
        before: Inst,
        opcode: Opcode,
        operands: OperandList<Value>,
        param: Param,
    ) -> Result<Inst> {
        if opcode.is_terminator() || opcode == Opcode::Phi {
            return Err(error::invalid_parameter(
                "insert-before cannot insert a terminator or a phi",
            ));
        }
        let pos = {
            let data = self.block_data(block)?;
            data.instructions
                .iter()
                .position(|&i| i == before)
                .ok_or_else(|| error::invalid_parameter("`before` not found in block"))?
        };
        let inst = self.instructions.push(InstData {
            instruction: Instruction {
                opcode,
                operands: operands.clone(),
                param,
            },
            block,
            removed: false,
        });
        self.record_uses(inst, &operands);
        self.block_data_mut(block)?.instructions.insert(pos, inst);
        if let Some(listener) = self.listener.as_mut() {
            listener.instruction_added(inst);
        }
        Ok(inst)
    }

    /// `drop-instruction`: remove `inst` from its block and the use-def index. Fails with
    /// `invalid-state` if `inst` still has uses.
    pub fn drop_instruction(&mut self, inst: Inst) -> Result<()> {
        if !self.use_def[inst].is_empty() {
            return Err(error::invalid_state(format!(
                "instruction {} still has uses",
                inst
            )));
        }
        self.unlink(inst)?;
        let operands = self.instructions[inst].instruction.operands.clone();
        self.forget_uses(inst, &operands);
        self.instructions[inst].removed = true;
        if let Some(listener) = self.listener.as_mut() {
            listener.instruction_removed(inst);
        }
        Ok(())
    }

    /// `true` if `inst` was dropped via [`Container::drop_instruction`]. `inst`'s data is kept
    /// around regardless (ids are never reclaimed), so passes that hold an id across a drop must
    /// check this before trusting it again.
    pub fn is_removed(&self, inst: Inst) -> Result<bool> {
        Ok(self
            .instructions
            .get(inst)
            .ok_or_else(|| error::invalid_parameter(format!("unknown instruction {}", inst)))?
            .removed)
    }

    fn unlink(&mut self, inst: Inst) -> Result<()> {
        let block = self.instruction_block(inst)?;
        let data = self.block_data_mut(block)?;
        if let Some(pos) = data.instructions.iter().position(|&i| i == inst) {
            data.instructions.remove(pos);
            if data.terminator == Some(inst) {
                data.terminator = None;
            }
        } else if let Some(pos) = data.phis.iter().position(|&i| i == inst) {
            data.phis.remove(pos);
        } else {
            return Err(error::invalid_state("instruction not linked in its block"));
        }
        Ok(())
    }

    /// `drop-control`: detach an instruction's control-flow effect without removing it, turning
    /// e.g. an `invoke` into a plain call by clearing its terminator status, or leaving a
    /// `branch`'s operand shape for a later pass to rewrite into unlinked jumps. This container
    /// only owns the terminator bookkeeping half of that contract: it clears `inst` from being
    /// its block's terminator so a pass can then rewrite its opcode via drop+append.
    pub fn drop_control(&mut self, inst: Inst) -> Result<()> {
        let block = self.instruction_block(inst)?;
        let data = self.block_data_mut(block)?;
        if data.terminator == Some(inst) {
            data.terminator = None;
            Ok(())
        } else {
            Err(error::invalid_state(format!(
                "instruction {} is not its block's terminator",
                inst
            )))
        }
    }

    /// Turn `inst` into a different instruction in place, keeping its id (and so every existing
    /// use of it as a value) intact. This is how constant folding and strength reduction simplify
    /// an instruction without disturbing its position in the block's program order or forcing
    /// their callers to thread a `replace-uses` through every user by hand. Fails with
    /// `invalid-state` if `new_opcode` is a terminator and `inst` is not already its block's
    /// terminator, or vice versa (terminator-ness may not change via this path).
    pub fn replace_instruction_in_place(
        &mut self,
        inst: Inst,
        new_opcode: Opcode,
        new_operands: OperandList<Value>,
        new_param: Param,
    ) -> Result<()> {
        let block = self.instruction_block(inst)?;
        let was_terminator = self.block_data(block)?.terminator == Some(inst);
        if was_terminator != new_opcode.is_terminator() {
            return Err(error::invalid_state(
                "replace-in-place cannot change an instruction's terminator-ness",
            ));
        }
        let old_operands = self.instructions[inst].instruction.operands.clone();
        self.forget_uses(inst, &old_operands);
        self.instructions[inst].instruction = Instruction {
            opcode: new_opcode,
            operands: new_operands.clone(),
            param: new_param,
        };
        self.record_uses(inst, &new_operands);
        Ok(())
    }

    /// `replace-uses`: rewrite every current use of `old` to reference `new` instead, updating
    /// the use-def index atomically.
    pub fn replace_uses(&mut self, old: Value, new: Value) -> Result<()> {
        let users: Vec<Inst> = self.use_def[old].iter().copied().collect();
        for user in users {
            let operand_count = self.instructions[user].instruction.operands.len();
            for i in 0..operand_count {
                if self.instructions[user].instruction.operands[i] == old {
                    self.instructions[user].instruction.operands[i] = new;
                    if let Some(listener) = self.listener.as_mut() {
                        listener.operand_changed(user, i, old, new);
                    }
                }
            }
            self.use_def[new].insert(user);
        }
        self.use_def[old].clear();

        // Phi inputs reference values too, but aren't tracked via `instructions[..].operands`.
        let phi_users: Vec<Inst> = self
            .instructions
            .keys()
            .filter(|&inst| {
                self.phi_inputs
                    .get(inst)
                    .map(|p| p.inputs.iter().any(|&(_, v)| v == old))
                    .unwrap_or(false)
            })
            .collect();
        for phi in phi_users {
            for (_, v) in self.phi_inputs[phi].inputs.iter_mut() {
                if *v == old {
                    *v = new;
                }
            }
        }
        Ok(())
    }

    /// Append a `jump` to `target`.
    pub fn append_jump(&mut self, block: Block, target: Block) -> Result<Inst> {
        self.append_instruction(
            block,
            Opcode::Jump,
            OperandList::new(),
            Param::Block(target.index() as u32),
        )
    }

    /// Append a `branch` on `condition` to `if_true` or `if_false`.
    pub fn append_branch(
        &mut self,
        block: Block,
        condition: Value,
        if_true: Block,
        if_false: Block,
    ) -> Result<Inst> {
        let mut operands = OperandList::new();
        operands.push(condition);
        self.append_instruction(
            block,
            Opcode::Branch,
            operands,
            Param::BlockPair(if_true.index() as u32, if_false.index() as u32),
        )
    }

    /// Register an out-of-line switch table and append a `switch` on `value` dispatching through
    /// it.
    pub fn append_switch(
        &mut self,
        block: Block,
        value: Value,
        table: SwitchTable,
    ) -> Result<Inst> {
        let index = self.switch_tables.len() as u32;
        self.switch_tables.push(table);
        let mut operands = OperandList::new();
        operands.push(value);
        self.append_instruction(block, Opcode::Switch, operands, Param::SwitchTable(index))
    }

    /// The case table registered for a `switch` instruction's `Param::SwitchTable` index.
    pub fn switch_table(&self, index: u32) -> Result<&SwitchTable> {
        self.switch_tables
            .get(index as usize)
            .ok_or_else(|| error::invalid_parameter(format!("unknown switch table {}", index)))
    }

    /// The blocks `block`'s terminator can transfer control to, in no particular order. Empty if
    /// `block` has no terminator yet (the container allows this transiently while a function is
    /// still being built).
    pub fn successors(&self, block: Block) -> Result<Vec<Block>> {
        let Some(term) = self.block_data(block)?.terminator else {
            return Ok(Vec::new());
        };
        let instr = self.instruction(term)?;
        Ok(match (instr.opcode, &instr.param) {
            (Opcode::Jump, Param::Block(b)) => vec![Block::new(*b as usize)],
            (Opcode::Branch, Param::BlockPair(t, f)) => {
                vec![Block::new(*t as usize), Block::new(*f as usize)]
            }
            (Opcode::Switch, Param::SwitchTable(index)) => {
                let table = self.switch_table(*index)?;
                let mut targets: Vec<Block> = table.cases.iter().map(|(_, b)| *b).collect();
                targets.push(table.default);
                targets
            }
            _ => Vec::new(),
        })
    }

    /// Add a phi node to `block`, returning its `Inst` id. The phi starts with no predecessor
    /// inputs; use [`Container::phi_set_input`] to populate them.
    pub fn add_phi(&mut self, block: Block) -> Result<Inst> {
        self.append_instruction(block, Opcode::Phi, OperandList::new(), Param::None)
    }

    /// `phi-set-input`: add or update `phi`'s input for `pred_block`, keeping the use-def index
    /// indexed.
    pub fn phi_set_input(&mut self, phi: Inst, pred_block: Block, value: Value) -> Result<()> {
        if self.instructions[phi].instruction.opcode != Opcode::Phi {
            return Err(error::invalid_parameter(format!("{} is not a phi", phi)));
        }
        let entry = &mut self.phi_inputs[phi];
        if let Some(existing) = entry.inputs.iter_mut().find(|(b, _)| *b == pred_block) {
            let old = existing.1;
            existing.1 = value;
            self.use_def[old].remove(&phi);
        } else {
            entry.inputs.push((pred_block, value));
        }
        self.use_def[value].insert(phi);
        Ok(())
    }

    /// The current `(predecessor, value)` bindings of `phi`.
    pub fn phi_inputs(&self, phi: Inst) -> &[(Block, Value)] {
        self.phi_inputs
            .get(phi)
            .map(|p| p.inputs.as_slice())
            .unwrap_or(&[])
    }

    /// `instr-use-iterator`: the instruction ids that currently use `instr` as an operand. Safe
    /// against the removal of the user under iteration (the snapshot is taken up front); a caller
    /// that mutates the use set beyond what was already visible must rebuild the iterator.
    pub fn instr_use_iterator(&self, instr: Inst) -> impl Iterator<Item = Inst> + '_ {
        self.use_def[instr].iter().copied()
    }

    /// Number of current uses of `instr`. `0` means `instr` is dead unless it has a side effect.
    pub fn use_count(&self, instr: Inst) -> usize {
        self.use_def[instr].len()
    }

    /// Every instruction id ever allocated, in allocation order (includes both live and, for
    /// instructions dropped without id reuse, now-unreferenced ids — callers should check
    /// liveness via block membership, e.g. by cross-referencing [`Container::block_instructions`]
    /// and [`Container::block_phis`]).
    pub fn all_instructions(&self) -> impl Iterator<Item = Inst> {
        self.instructions.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_ir::opcode::OperandList as Ops;

    fn push_op(v: Value) -> Ops<Value> {
        let mut ops = Ops::new();
        ops.push(v);
        ops
    }

    #[test]
    fn append_and_use_def_stay_consistent() {
        let mut c = Container::new();
        let block = c.new_block();
        let a = c
            .append_instruction(block, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        let b = c
            .append_instruction(block, Opcode::IntNeg, push_op(a), Param::None)
            .unwrap();
        assert_eq!(c.use_count(a), 1);
        assert_eq!(c.instr_use_iterator(a).collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn second_terminator_is_invalid_state() {
        let mut c = Container::new();
        let block = c.new_block();
        c.append_instruction(block, Opcode::Return, OperandList::new(), Param::None)
            .unwrap();
        let err = c
            .append_instruction(block, Opcode::Return, OperandList::new(), Param::None)
            .unwrap_err();
        assert_eq!(err.kind(), ssacc_ir::error::ErrorKind::InvalidState);
    }

    #[test]
    fn drop_with_outstanding_uses_fails() {
        let mut c = Container::new();
        let block = c.new_block();
        let a = c
            .append_instruction(block, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        c.append_instruction(block, Opcode::IntNeg, push_op(a), Param::None)
            .unwrap();
        let err = c.drop_instruction(a).unwrap_err();
        assert_eq!(err.kind(), ssacc_ir::error::ErrorKind::InvalidState);
    }

    #[test]
    fn replace_uses_rewrites_operands_and_index() {
        let mut c = Container::new();
        let block = c.new_block();
        let a = c
            .append_instruction(block, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        let d = c
            .append_instruction(block, Opcode::ConstInt, OperandList::new(), Param::Int(2))
            .unwrap();
        let user = c
            .append_instruction(block, Opcode::IntNeg, push_op(a), Param::None)
            .unwrap();
        c.replace_uses(a, d).unwrap();
        assert_eq!(c.use_count(a), 0);
        assert_eq!(c.use_count(d), 1);
        assert_eq!(c.instruction(user).unwrap().operands[0], d);
    }

    #[test]
    fn phi_inputs_are_indexed_and_updatable() {
        let mut c = Container::new();
        let pred0 = c.new_block();
        let pred1 = c.new_block();
        let join = c.new_block();
        let v0 = c
            .append_instruction(pred0, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        let v1 = c
            .append_instruction(pred1, Opcode::ConstInt, OperandList::new(), Param::Int(2))
            .unwrap();
        let phi = c.add_phi(join).unwrap();
        c.phi_set_input(phi, pred0, v0).unwrap();
        c.phi_set_input(phi, pred1, v1).unwrap();
        assert_eq!(c.phi_inputs(phi).len(), 2);
        assert_eq!(c.use_count(v0), 1);

        // Updating an existing predecessor's input drops the old use and adds the new one.
        let v2 = c
            .append_instruction(pred0, Opcode::ConstInt, OperandList::new(), Param::Int(3))
            .unwrap();
        c.phi_set_input(phi, pred0, v2).unwrap();
        assert_eq!(c.use_count(v0), 0);
        assert_eq!(c.use_count(v2), 1);
        assert_eq!(c.phi_inputs(phi).len(), 2);
    }

    #[test]
    fn replace_in_place_keeps_id_and_rewires_operands() {
        let mut c = Container::new();
        let block = c.new_block();
        let a = c
            .append_instruction(block, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        let b = c
            .append_instruction(block, Opcode::ConstInt, OperandList::new(), Param::Int(2))
            .unwrap();
        let add = c
            .append_instruction(block, Opcode::IntAdd, push_op(a), Param::None)
            .unwrap();
        let user = c
            .append_instruction(block, Opcode::IntNeg, push_op(add), Param::None)
            .unwrap();

        c.replace_instruction_in_place(add, Opcode::ConstInt, OperandList::new(), Param::Int(3))
            .unwrap();
        assert_eq!(c.use_count(a), 0);
        assert_eq!(c.instruction(add).unwrap().opcode, Opcode::ConstInt);
        // `user` still references `add`'s id; only its payload changed.
        assert_eq!(c.instruction(user).unwrap().operands[0], add);
        assert_eq!(c.use_count(add), 1);
        let _ = b;
    }

    #[test]
    fn insert_before_lands_ahead_of_the_target() {
        let mut c = Container::new();
        let block = c.new_block();
        let a = c
            .append_instruction(block, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        let new = c
            .insert_before(block, a, Opcode::ConstInt, OperandList::new(), Param::Int(2))
            .unwrap();
        assert_eq!(c.block_instr_head(block).unwrap(), Some(new));
        assert_eq!(c.sibling(new).unwrap(), Some(a));
    }

    #[test]
    fn block_traversal_walks_program_order() {
        let mut c = Container::new();
        let block = c.new_block();
        let a = c
            .append_instruction(block, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        let b = c
            .append_instruction(block, Opcode::ConstInt, OperandList::new(), Param::Int(2))
            .unwrap();
        assert_eq!(c.block_instr_head(block).unwrap(), Some(a));
        assert_eq!(c.sibling(a).unwrap(), Some(b));
        assert_eq!(c.block_instr_tail(block).unwrap(), Some(b));
    }

    #[test]
    fn successors_follow_jump_branch_and_switch() {
        let mut c = Container::new();
        let entry = c.new_block();
        let left = c.new_block();
        let right = c.new_block();
        let tail = c.new_block();

        let cond = c
            .append_instruction(entry, Opcode::ConstInt, OperandList::new(), Param::Int(1))
            .unwrap();
        c.append_branch(entry, cond, left, right).unwrap();
        assert_eq!(
            c.successors(entry).unwrap().into_iter().collect::<HashSet<_>>(),
            HashSet::from([left, right])
        );

        c.append_jump(left, tail).unwrap();
        assert_eq!(c.successors(left).unwrap(), vec![tail]);

        let disc = c
            .append_instruction(right, Opcode::ConstInt, OperandList::new(), Param::Int(2))
            .unwrap();
        c.append_switch(
            right,
            disc,
            SwitchTable {
                cases: vec![(0, left), (1, tail)],
                default: tail,
            },
        )
        .unwrap();
        let succs: HashSet<_> = c.successors(right).unwrap().into_iter().collect();
        assert_eq!(succs, HashSet::from([left, tail]));
    }
}
