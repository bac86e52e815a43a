//! The ABI-aware function declaration: wraps an [`ssacc_ir::FunctionDecl`] with its System V
//! classification and exposes the query surface the codegen driver and prologue emitter need.

use crate::classify::{classify_function, FunctionClassification, ImplicitReturnPointer, ParameterClassification};
use crate::layout::{calculate_type_layout, LayoutContext, TypeLayout, Variant};
use ssacc_ir::error::Result;
use ssacc_ir::{FunctionDecl, IrType};

/// A function declaration together with its computed System V classification: where each
/// parameter and the return value land, and whether the return uses a hidden pointer parameter.
pub struct AbiFunctionDecl {
    decl: FunctionDecl,
    parameter_types: Vec<IrType>,
    return_type: Option<IrType>,
    classification: FunctionClassification,
    parameter_layouts: Vec<TypeLayout>,
    return_layout: Option<TypeLayout>,
}

impl AbiFunctionDecl {
    /// Classify `decl`'s parameter and return types and build the full ABI view.
    pub fn new(decl: FunctionDecl, parameter_types: Vec<IrType>, return_type: Option<IrType>) -> Result<Self> {
        let classification = classify_function(&parameter_types, return_type.as_ref())?;
        let mut parameter_layouts = Vec::with_capacity(parameter_types.len());
        for ty in &parameter_types {
            parameter_layouts.push(calculate_type_layout(Variant::SystemV, LayoutContext::Stack, ty)?);
        }
        let return_layout = match &return_type {
            Some(ty) => Some(calculate_type_layout(Variant::SystemV, LayoutContext::Stack, ty)?),
            None => None,
        };
        Ok(AbiFunctionDecl {
            decl,
            parameter_types,
            return_type,
            classification,
            parameter_layouts,
            return_layout,
        })
    }

    /// The underlying IR-level declaration (param/result type ids, variadic flag).
    pub fn ir_decl(&self) -> &FunctionDecl {
        &self.decl
    }

    /// Classification (eightbyte classes and register/stack placement) for parameter `index`.
    pub fn parameter_placements(&self, index: usize) -> Option<&ParameterClassification> {
        self.classification.parameters.get(index)
    }

    /// Layout of parameter `index`'s type.
    pub fn parameter_layout(&self, index: usize) -> Option<&TypeLayout> {
        self.parameter_layouts.get(index)
    }

    /// The parameter type at `index`.
    pub fn parameter_type(&self, index: usize) -> Option<&IrType> {
        self.parameter_types.get(index)
    }

    /// Classification of the return value, `None` for `void` or when it returns via an implicit
    /// pointer (see [`AbiFunctionDecl::implicit_return_pointer`]).
    pub fn return_placements(&self) -> Option<&ParameterClassification> {
        self.classification.return_value.as_ref()
    }

    /// Layout of the return type, if any.
    pub fn return_layout(&self) -> Option<&TypeLayout> {
        self.return_layout.as_ref()
    }

    /// The return type, if any.
    pub fn return_type(&self) -> Option<&IrType> {
        self.return_type.as_ref()
    }

    /// Whether (and in which integer register) the return value uses an implicit pointer
    /// parameter.
    pub fn implicit_return_pointer(&self) -> ImplicitReturnPointer {
        self.classification.implicit_return_pointer
    }

    /// Number of SSE registers consumed by the fixed (non-variadic-tail) parameters, i.e. the
    /// value a variadic call's prologue must load into `al` per the System V variadic-call
    /// convention.
    pub fn sse_register_count(&self) -> u8 {
        self.classification
            .parameters
            .iter()
            .flat_map(|p| p.placements.iter())
            .filter(|placement| matches!(placement, crate::classify::Placement::SseRegister(_)))
            .count() as u8
    }

    /// `true` if this declaration's signature is variadic.
    pub fn is_variadic(&self) -> bool {
        self.decl.variadic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_ir::{EntityRef, TypeCode, TypeEntry, TypeId};

    fn scalar(code: TypeCode) -> IrType {
        let mut ty = IrType::new();
        ty.push(TypeEntry::scalar(code));
        ty
    }

    #[test]
    fn variadic_sse_count_reflects_fixed_float_args() {
        let decl = FunctionDecl {
            params_type: TypeId::new(0),
            result_type: TypeId::new(1),
            variadic: true,
        };
        let abi_decl = AbiFunctionDecl::new(
            decl,
            vec![scalar(TypeCode::F64), scalar(TypeCode::Int), scalar(TypeCode::F32)],
            None,
        )
        .unwrap();
        assert_eq!(abi_decl.sse_register_count(), 2);
        assert!(abi_decl.is_variadic());
    }
}
