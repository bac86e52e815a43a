//! `IrModule`: the translation unit as the optimizer and codegen driver receive it.

use crate::data::IrData;
use crate::debuginfo::DebugInfo;
use crate::error::{self, Result};
use crate::function::{Identifier, IrFunction};
use crate::stringpool::{StringId, StringPool};
use crate::types::{IrType, TypeId};
use ssacc_entity::{entity_impl, EntityRef};
use std::collections::HashMap;

/// A reference to a module-owned [`IrData`] object.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataId(u32);
entity_impl!(DataId, "data");

/// The translation unit consumed by the optimizer and codegen driver: identifiers, types,
/// functions, data, the shared string pool, and the debug-info side-table.
#[derive(Default)]
pub struct IrModule {
    strings: StringPool,
    identifiers: HashMap<StringId, Identifier>,
    types: Vec<IrType>,
    functions: HashMap<StringId, IrFunction>,
    data: Vec<IrData>,
    debug_info: DebugInfo,
}

impl IrModule {
    /// An empty module.
    pub fn new() -> Self {
        IrModule::default()
    }

    /// The shared string pool.
    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    /// The shared string pool, mutably.
    pub fn strings_mut(&mut self) -> &mut StringPool {
        &mut self.strings
    }

    /// The debug-info side-table.
    pub fn debug_info(&self) -> &DebugInfo {
        &self.debug_info
    }

    /// The debug-info side-table, mutably.
    pub fn debug_info_mut(&mut self) -> &mut DebugInfo {
        &mut self.debug_info
    }

    /// Register `name` as an identifier. Fails with `already-exists` if `name` is already
    /// declared.
    pub fn declare_identifier(&mut self, name: StringId, identifier: Identifier) -> Result<()> {
        if self.identifiers.contains_key(&name) {
            return Err(error::already_exists(format!(
                "identifier `{}` already declared",
                self.strings.resolve(name)
            )));
        }
        self.identifiers.insert(name, identifier);
        Ok(())
    }

    /// Look up an identifier's record by name.
    pub fn identifier(&self, name: StringId) -> Result<&Identifier> {
        self.identifiers
            .get(&name)
            .ok_or_else(|| error::not_found(format!("identifier `{}`", self.strings.resolve(name))))
    }

    /// Add a new type, returning its id.
    pub fn add_type(&mut self, ty: IrType) -> TypeId {
        let id = TypeId::new(self.types.len());
        self.types.push(ty);
        id
    }

    /// Look up a type by id.
    pub fn ty(&self, id: TypeId) -> Result<&IrType> {
        self.types
            .get(id.index())
            .ok_or_else(|| error::invalid_parameter(format!("unknown type id {}", id)))
    }

    /// Insert a function, keyed by its own name. Fails with `already-exists` if a function with
    /// that name is already present.
    pub fn add_function(&mut self, function: IrFunction) -> Result<()> {
        let name = function.name();
        if self.functions.contains_key(&name) {
            return Err(error::already_exists(format!(
                "function `{}` already defined",
                self.strings.resolve(name)
            )));
        }
        self.functions.insert(name, function);
        Ok(())
    }

    /// Look up a function by name.
    pub fn function(&self, name: StringId) -> Result<&IrFunction> {
        self.functions
            .get(&name)
            .ok_or_else(|| error::not_found(format!("function `{}`", self.strings.resolve(name))))
    }

    /// Look up a function by name, mutably.
    pub fn function_mut(&mut self, name: StringId) -> Result<&mut IrFunction> {
        self.functions
            .get_mut(&name)
            .ok_or_else(|| error::not_found("function"))
    }

    /// Iterate all functions, in unspecified order.
    pub fn functions(&self) -> impl Iterator<Item = &IrFunction> {
        self.functions.values()
    }

    /// Add a data object, returning its id.
    pub fn add_data(&mut self, data: IrData) -> DataId {
        let id = DataId::new(self.data.len());
        self.data.push(data);
        id
    }

    /// Look up a data object by id.
    pub fn data(&self, id: DataId) -> Result<&IrData> {
        self.data
            .get(id.index())
            .ok_or_else(|| error::invalid_parameter(format!("unknown data id {}", id)))
    }

    /// Look up a data object by id, mutably.
    pub fn data_mut(&mut self, id: DataId) -> Result<&mut IrData> {
        self.data
            .get_mut(id.index())
            .ok_or_else(|| error::invalid_parameter(format!("unknown data id {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FunctionDecl, IdentifierKind, Scope};

    #[test]
    fn duplicate_function_name_fails() {
        let mut module = IrModule::new();
        let name = module.strings_mut().intern("f");
        let void_ty = module.add_type(IrType::new());
        let decl = FunctionDecl {
            params_type: void_ty,
            result_type: void_ty,
            variadic: false,
        };
        module
            .add_function(IrFunction::new(name, decl, void_ty))
            .unwrap();
        let err = module
            .add_function(IrFunction::new(name, decl, void_ty))
            .unwrap_err();
        assert_eq!(err.kind(), error::ErrorKind::AlreadyExists);
    }

    #[test]
    fn identifier_round_trips() {
        let mut module = IrModule::new();
        let name = module.strings_mut().intern("g");
        module
            .declare_identifier(
                name,
                Identifier {
                    kind: IdentifierKind::Function,
                    scope: Scope::Export,
                    alias: None,
                    debug_type_id: None,
                },
            )
            .unwrap();
        assert_eq!(module.identifier(name).unwrap().scope, Scope::Export);
    }
}
