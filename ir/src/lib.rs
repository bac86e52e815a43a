//! IR module data model: identifiers, flattened types, global data initialisers, the closed
//! opcode enum, the legacy stack-machine function body, and the debug-info side-table.
//!
//! This is the data the AST translator hands to the optimizer (`ssacc-optimizer`) and,
//! ultimately, the codegen driver. It has no notion of basic blocks or SSA values; those are
//! built by `ssacc-optimizer` on top of the opcode and type vocabulary defined here.

pub mod data;
pub mod debuginfo;
pub mod error;
pub mod function;
pub mod module;
pub mod opcode;
pub mod stringpool;
pub mod types;

pub use data::{Charset, DataValue, IrData, Storage, SymbolRef};
pub use debuginfo::{DebugAttribute, DebugEntry, DebugEntryId, DebugEntryKind, DebugInfo};
pub use error::{Error, ErrorKind, Result};
pub use function::{FunctionDecl, Identifier, IdentifierKind, IrFunction, Scope};
pub use module::{DataId, IrModule};
pub use opcode::{
    AtomicRmwOp, BitBuiltin, CmpOp, FloatWidth, Instruction, IntWidth, Opcode, OperandList, Param,
};
pub use stringpool::{StringId, StringPool};
pub use types::{IrType, Slot, TypeCode, TypeEntry, TypeId};

pub use ssacc_entity::EntityRef;
