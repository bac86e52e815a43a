//! System-V AMD64 parameter and return-value classification: the eightbyte equivalence-class
//! algorithm and register/stack allocation built on top of it.

use crate::layout::{calculate_type_layout, LayoutContext, TypeLayout, Variant};
use ssacc_ir::error::{self, Result};
use ssacc_ir::{EntityRef, IrType, Slot, TypeCode};

/// One of the System V equivalence classes an eightbyte can end up in. Classification starts
/// every eightbyte at `NoClass` and merges in each member's class as the tree is walked;
/// `merge` implements the documented precedence.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EightbyteClass {
    /// No member has touched this eightbyte yet (padding, or an empty trailing eightbyte).
    NoClass,
    /// Passed/returned in a general-purpose register.
    Integer,
    /// Passed/returned in the low 64 bits of an SSE register.
    Sse,
    /// The high 64 bits of a 16-byte SSE value occupying the eightbyte above an `Sse` one.
    SseUp,
    /// Passed/returned on the x87 stack.
    X87,
    /// The upper half of an x87 `long double`'s second eightbyte.
    X87Up,
    /// A complex `long double`'s imaginary half, classified alongside an `X87`/`X87Up` pair.
    ComplexX87,
    /// Forces the whole parameter to memory.
    Memory,
}

impl EightbyteClass {
    /// Merge two classes for the same eightbyte per the System V precedence table: equal classes
    /// are idempotent; `Memory` dominates everything; `Integer` dominates the SSE family;
    /// otherwise the lower-priority (more specific) class of the two wins, defaulting to `Sse`
    /// when neither side is `NoClass`/equal/`Memory`/`Integer`.
    pub fn merge(self, other: EightbyteClass) -> EightbyteClass {
        use EightbyteClass::*;
        if self == other {
            return self;
        }
        if self == NoClass {
            return other;
        }
        if other == NoClass {
            return self;
        }
        if self == Memory || other == Memory {
            return Memory;
        }
        if self == Integer || other == Integer {
            return Integer;
        }
        if matches!(self, X87 | X87Up | ComplexX87) || matches!(other, X87 | X87Up | ComplexX87) {
            return Memory;
        }
        Sse
    }
}

const EIGHTBYTE: u64 = 8;

/// Classify `ty` (already laid out as `layout`) into one [`EightbyteClass`] per 8-byte chunk of
/// its size, per the System V recursive aggregate-classification algorithm: each scalar member
/// contributes its natural class to the eightbyte(s) its byte range overlaps; aggregates recurse;
/// anything larger than two eightbytes, containing an unaligned member, or carrying x87 data
/// outside eightbyte 0 is forced entirely to memory.
pub fn classify_eightbytes(ty: &IrType, layout: &TypeLayout) -> Result<Vec<EightbyteClass>> {
    let (size, alignment) = crate::layout::calculate_type_properties(ty, layout)?;
    if size > 16 || ty.is_empty() {
        let n = ((size + EIGHTBYTE - 1) / EIGHTBYTE).max(1) as usize;
        return Ok(vec![EightbyteClass::Memory; n]);
    }
    let eightbyte_count = ((size + EIGHTBYTE - 1) / EIGHTBYTE).max(1) as usize;
    let mut classes = vec![EightbyteClass::NoClass; eightbyte_count];
    classify_into(ty, layout, Slot::new(0), 0, &mut classes)?;

    if alignment > 16 {
        return Ok(vec![EightbyteClass::Memory; eightbyte_count]);
    }
    if classes.iter().any(|&c| c == EightbyteClass::X87 || c == EightbyteClass::X87Up)
        && eightbyte_count > 1
        && classes[0] != EightbyteClass::X87
    {
        return Ok(vec![EightbyteClass::Memory; eightbyte_count]);
    }
    Ok(classes)
}

fn classify_into(
    ty: &IrType,
    layout: &TypeLayout,
    slot: Slot,
    base_offset: u64,
    classes: &mut [EightbyteClass],
) -> Result<()> {
    if slot.index() >= ty.len() {
        return Ok(());
    }
    let entry = ty
        .entry(slot)
        .ok_or_else(|| error::invalid_parameter("missing type entry"))?;
    let entry_layout = *layout.at(slot)?;
    let offset = base_offset + entry_layout.relative_offset;

    match entry.typecode {
        TypeCode::Struct => {
            let child_count = entry.child_count();
            let mut child = Slot::new(slot.index() + 1);
            for _ in 0..child_count {
                classify_into(ty, layout, child, offset, classes)?;
                child = ty.subtree_end(child);
            }
        }
        TypeCode::Union => {
            let child_count = entry.child_count();
            let mut child = Slot::new(slot.index() + 1);
            for _ in 0..child_count {
                classify_into(ty, layout, child, offset, classes)?;
                child = ty.subtree_end(child);
            }
        }
        TypeCode::Array => {
            let element = Slot::new(slot.index() + 1);
            let element_layout = *layout.at(element)?;
            let length = entry.param;
            for i in 0..length {
                classify_into(ty, layout, element, offset + i * element_layout.size, classes)?;
            }
        }
        TypeCode::Bitfield => {
            merge_range(classes, offset, entry.bitfield_base_size() as u64, EightbyteClass::Integer);
        }
        TypeCode::LongDouble => {
            merge_range(classes, offset, 8, EightbyteClass::X87);
            merge_range(classes, offset + 8, 8, EightbyteClass::X87Up);
        }
        TypeCode::ComplexLongDouble => {
            merge_range(classes, offset, 8, EightbyteClass::X87);
            merge_range(classes, offset + 8, 8, EightbyteClass::X87Up);
            merge_range(classes, offset + 16, 8, EightbyteClass::X87);
            merge_range(classes, offset + 24, 8, EightbyteClass::X87Up);
        }
        TypeCode::F32 | TypeCode::F64 | TypeCode::Complex32 | TypeCode::Complex64 => {
            merge_range(classes, offset, entry_layout.size, EightbyteClass::Sse);
        }
        TypeCode::None => {}
        _ => {
            merge_range(classes, offset, entry_layout.size, EightbyteClass::Integer);
        }
    }
    Ok(())
}

fn merge_range(classes: &mut [EightbyteClass], offset: u64, size: u64, class: EightbyteClass) {
    if size == 0 {
        return;
    }
    let first = (offset / EIGHTBYTE) as usize;
    let last = ((offset + size - 1) / EIGHTBYTE) as usize;
    for eb in classes.iter_mut().take(last + 1).skip(first) {
        *eb = eb.merge(class);
    }
}

/// Where a classified argument or return value ultimately lands.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// A general-purpose register, named by its System V calling-convention index (0 = first
    /// integer arg register).
    IntegerRegister(u8),
    /// An SSE register, named by its index.
    SseRegister(u8),
    /// The x87 register stack (returns only).
    X87,
    /// A stack slot at the given byte offset from the argument area's start.
    Stack(u64),
    /// Memory via an implicit pointer parameter (large-aggregate return).
    ImplicitPointer,
}

const INTEGER_ARG_REGISTERS: usize = 6;
const SSE_ARG_REGISTERS: usize = 8;
const INTEGER_RETURN_REGISTERS: usize = 2;
const SSE_RETURN_REGISTERS: usize = 2;

/// The full classification result for one parameter or the return value: its eightbyte classes
/// and, once allocated, where each eightbyte landed.
#[derive(Clone, Debug)]
pub struct ParameterClassification {
    /// Per-eightbyte classes.
    pub classes: Vec<EightbyteClass>,
    /// Per-eightbyte placement, parallel to `classes`.
    pub placements: Vec<Placement>,
}

/// Register allocation state threaded across the parameters of one function (and, separately,
/// across its return value).
#[derive(Default)]
struct Allocator {
    next_integer: usize,
    next_sse: usize,
    stack_offset: u64,
}

impl Allocator {
    fn allocate(&mut self, classes: &[EightbyteClass], integer_pool: usize, sse_pool: usize) -> Option<Vec<Placement>> {
        let needed_integer = classes
            .iter()
            .filter(|c| matches!(c, EightbyteClass::Integer))
            .count();
        let needed_sse = classes
            .iter()
            .filter(|c| matches!(c, EightbyteClass::Sse | EightbyteClass::SseUp))
            .count();
        if classes.iter().any(|&c| c == EightbyteClass::Memory)
            || self.next_integer + needed_integer > integer_pool
            || self.next_sse + needed_sse > sse_pool
        {
            return None;
        }
        let mut placements = Vec::with_capacity(classes.len());
        for &class in classes {
            match class {
                EightbyteClass::Integer => {
                    placements.push(Placement::IntegerRegister(self.next_integer as u8));
                    self.next_integer += 1;
                }
                EightbyteClass::Sse | EightbyteClass::SseUp => {
                    placements.push(Placement::SseRegister(self.next_sse as u8));
                    self.next_sse += 1;
                }
                EightbyteClass::NoClass => placements.push(Placement::IntegerRegister(self.next_integer as u8)),
                EightbyteClass::X87 | EightbyteClass::X87Up | EightbyteClass::ComplexX87 => {
                    placements.push(Placement::X87)
                }
                EightbyteClass::Memory => unreachable!("checked above"),
            }
        }
        Some(placements)
    }

    fn allocate_stack(&mut self, classes: &[EightbyteClass]) -> Vec<Placement> {
        classes
            .iter()
            .map(|_| {
                let offset = pad_stack(self.stack_offset);
                self.stack_offset = offset + 8;
                Placement::Stack(offset)
            })
            .collect()
    }
}

fn pad_stack(offset: u64) -> u64 {
    crate::layout::pad_aligned(offset, 8)
}

/// Classify and allocate one parameter, given the allocator state for the whole parameter list.
/// Falls back to the stack if the register pool required for this parameter's classes is
/// exhausted, per spec: a parameter never splits across registers and stack.
fn classify_and_allocate(ty: &IrType, allocator: &mut Allocator) -> Result<ParameterClassification> {
    let layout = calculate_type_layout(Variant::SystemV, LayoutContext::Stack, ty)?;
    let classes = classify_eightbytes(ty, &layout)?;
    let placements = allocator
        .allocate(&classes, INTEGER_ARG_REGISTERS, SSE_ARG_REGISTERS)
        .unwrap_or_else(|| allocator.allocate_stack(&classes));
    Ok(ParameterClassification { classes, placements })
}

/// Whether, and in which register, the return value uses an implicit first pointer parameter
/// (large-aggregate return by hidden pointer).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImplicitReturnPointer {
    /// No implicit pointer; the return fits in registers (or is void).
    None,
    /// The return is via a hidden pointer passed in the named integer register (always register
    /// 0, `rdi`, since it is allocated before any real parameter).
    Register(u8),
}

/// The full classification of a function's parameters and return value.
pub struct FunctionClassification {
    /// Per-parameter classification, in declaration order.
    pub parameters: Vec<ParameterClassification>,
    /// The return value's classification, `None` for `void`.
    pub return_value: Option<ParameterClassification>,
    /// Whether the return uses an implicit pointer parameter.
    pub implicit_return_pointer: ImplicitReturnPointer,
}

/// Classify every parameter in `parameter_types` plus `return_type` (`None` for `void`).
///
/// Aggregates whose return classification needs more than two eightbytes return via an implicit
/// pointer passed in `rdi`; that consumes the first integer-argument register before any real
/// parameter is allocated.
pub fn classify_function(
    parameter_types: &[IrType],
    return_type: Option<&IrType>,
) -> Result<FunctionClassification> {
    let mut implicit_return_pointer = ImplicitReturnPointer::None;
    let mut param_allocator = Allocator::default();

    let return_value = match return_type {
        None => None,
        Some(ret_ty) => {
            let layout = calculate_type_layout(Variant::SystemV, LayoutContext::Stack, ret_ty)?;
            let classes = classify_eightbytes(ret_ty, &layout)?;
            if classes.len() > 2 || classes.iter().any(|&c| c == EightbyteClass::Memory) {
                implicit_return_pointer = ImplicitReturnPointer::Register(0);
                param_allocator.next_integer = 1;
                None
            } else {
                let mut ret_allocator = Allocator::default();
                let placements = ret_allocator
                    .allocate(&classes, INTEGER_RETURN_REGISTERS, SSE_RETURN_REGISTERS)
                    .unwrap_or_else(|| vec![Placement::X87; classes.len()]);
                Some(ParameterClassification { classes, placements })
            }
        }
    };

    let mut parameters = Vec::with_capacity(parameter_types.len());
    for ty in parameter_types {
        parameters.push(classify_and_allocate(ty, &mut param_allocator)?);
    }

    if implicit_return_pointer != ImplicitReturnPointer::None {
        log::trace!("classify_function: return value classifies as memory, using an implicit pointer");
    }

    Ok(FunctionClassification {
        parameters,
        return_value,
        implicit_return_pointer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_ir::{TypeEntry};

    fn scalar(code: TypeCode) -> IrType {
        let mut ty = IrType::new();
        ty.push(TypeEntry::scalar(code));
        ty
    }

    #[test]
    fn scalar_int_goes_to_integer_register() {
        let classification = classify_function(&[scalar(TypeCode::Int)], Some(&scalar(TypeCode::Int))).unwrap();
        assert_eq!(classification.parameters[0].classes, vec![EightbyteClass::Integer]);
        assert_eq!(
            classification.parameters[0].placements,
            vec![Placement::IntegerRegister(0)]
        );
        assert_eq!(
            classification.return_value.unwrap().placements,
            vec![Placement::IntegerRegister(0)]
        );
    }

    #[test]
    fn large_struct_return_uses_implicit_pointer() {
        let mut big = IrType::new();
        big.push(TypeEntry::aggregate_header(TypeCode::Struct, 3));
        big.push(TypeEntry::scalar(TypeCode::I64));
        big.push(TypeEntry::scalar(TypeCode::I64));
        big.push(TypeEntry::scalar(TypeCode::I64));
        let classification = classify_function(&[], Some(&big)).unwrap();
        assert!(classification.return_value.is_none());
        assert_eq!(
            classification.implicit_return_pointer,
            ImplicitReturnPointer::Register(0)
        );
    }

    #[test]
    fn exhausted_integer_pool_falls_back_to_stack() {
        let params: Vec<IrType> = (0..8).map(|_| scalar(TypeCode::Long)).collect();
        let classification = classify_function(&params, None).unwrap();
        for p in &classification.parameters[..6] {
            assert!(matches!(p.placements[0], Placement::IntegerRegister(_)));
        }
        for p in &classification.parameters[6..] {
            assert!(matches!(p.placements[0], Placement::Stack(_)));
        }
    }

    #[test]
    fn float_goes_to_sse_register() {
        let classification = classify_function(&[scalar(TypeCode::F64)], Some(&scalar(TypeCode::F64))).unwrap();
        assert_eq!(
            classification.parameters[0].placements,
            vec![Placement::SseRegister(0)]
        );
    }
}
