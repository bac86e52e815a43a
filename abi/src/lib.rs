//! System-V AMD64 ABI layer: type layout, parameter/return classification and the ABI-aware
//! function-declaration query surface consumed by the codegen driver.

pub mod classify;
pub mod function;
pub mod layout;

pub use classify::{
    classify_eightbytes, classify_function, EightbyteClass, FunctionClassification,
    ImplicitReturnPointer, ParameterClassification, Placement,
};
pub use function::AbiFunctionDecl;
pub use layout::{
    calculate_type_layout, calculate_type_properties, pad_aligned, LayoutContext, TypeEntryLayout,
    TypeLayout, Variant, LONG_DOUBLE_ALIGNMENT, LONG_DOUBLE_SIZE,
};
