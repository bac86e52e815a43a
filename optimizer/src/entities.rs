//! Entity references used by the SSA code container: blocks and instructions.
//!
//! An instruction and the SSA value it defines share one id: every instruction produces at most
//! one result (the closed opcode set has no multi-result opcodes), so there is no separate
//! `Value` arena to keep in sync with `Inst`. Phi nodes are ordinary `Inst`s with opcode `Phi`;
//! what makes them phis is that the container keeps them in a block's separate phi list instead
//! of its regular instruction sequence (see [`crate::container`]).

use ssacc_entity::entity_impl;

/// A reference to a block in an optimizer function.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A reference to an instruction, and simultaneously to the SSA value it produces (for
/// value-producing opcodes; control-only opcodes produce a value that is simply never used).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// An SSA value. Aliases [`Inst`] (see module docs); kept as a distinct name so call sites read
/// as "the value produced by an instruction" rather than "the instruction".
pub type Value = Inst;
