//! The optimizer: SSA construction primitives, the instruction/block container, the use-def
//! index, debug-info side-table tracking, inline-depth bookkeeping and the default
//! dead-code/dead-alloc/GVN/constant-fold/strength-reduce/tail-call transformation pipeline.
//!
//! This crate owns one `Container` per function; the codegen driver (`ssacc-codegen`) builds one
//! from an `ssacc-ir::IrFunction`'s legacy bytecode body, runs `passes::Pipeline::default_pipeline`
//! over it, and then lowers the result into its own virtual-assembly form.

pub mod build;
pub mod cfg;
pub mod container;
pub mod debugmap;
pub mod entities;
pub mod inlines;
pub mod passes;

pub use build::build_from_legacy;
pub use cfg::{ControlFlowGraph, Dominators};
pub use container::{Container, Listener, SwitchTable};
pub use debugmap::DebugInfoMapping;
pub use entities::{Block, Inst, Value};
pub use inlines::Inlines;
pub use passes::{Pass, Pipeline, PipelineConfig};
