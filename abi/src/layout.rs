//! System-V AMD64 size/alignment/offset computation over an [`ssacc_ir::IrType`].

use ssacc_ir::error::{self, Result};
use ssacc_ir::{EntityRef, IrType, Slot, TypeCode, TypeEntry};

/// The ABI flavour a layout is computed for. Only `system-v` is implemented; the enum exists so
/// the entry point has the same shape a multi-target build would need.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    /// System V AMD64.
    SystemV,
}

/// The context a layout is computed for, selecting platform-dependent scalar sizes (e.g. `long
/// double`'s actual, as opposed to ABI-padded, storage size differs between a stack slot and a
/// global's static storage in the source ABI; this backend's sizes happen to coincide, but the
/// context is threaded through so a future divergence has somewhere to live).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LayoutContext {
    /// A stack-resident value (parameter home, local, spill slot).
    Stack,
    /// A statically allocated global or thread-local object.
    Global,
    /// Neither of the above; used for ABI queries not tied to a concrete storage location.
    Generic,
}

/// Size, in bytes, of the System V `long double` (80-bit extended precision, 16-byte container).
pub const LONG_DOUBLE_SIZE: u64 = 16;
/// Alignment, in bytes, of the System V `long double`.
pub const LONG_DOUBLE_ALIGNMENT: u64 = 16;

fn scalar_size_alignment(code: TypeCode) -> (u64, u64) {
    match code {
        TypeCode::I8 | TypeCode::Char | TypeCode::Bool => (1, 1),
        TypeCode::I16 | TypeCode::Short => (2, 2),
        TypeCode::I32 | TypeCode::Int | TypeCode::F32 => (4, 4),
        TypeCode::I64 | TypeCode::Long | TypeCode::Word | TypeCode::F64 => (8, 8),
        TypeCode::Complex32 => (8, 4),
        TypeCode::Complex64 => (16, 8),
        TypeCode::LongDouble => (LONG_DOUBLE_SIZE, LONG_DOUBLE_ALIGNMENT),
        TypeCode::ComplexLongDouble => (LONG_DOUBLE_SIZE * 2, LONG_DOUBLE_ALIGNMENT),
        TypeCode::None => (0, 1),
        TypeCode::Struct | TypeCode::Array | TypeCode::Union | TypeCode::Bitfield => {
            unreachable!("scalar_size_alignment called on an aggregate/bitfield entry")
        }
    }
}

/// Round `offset` up to the next multiple of `alignment` (`alignment` a power of two).
pub fn pad_aligned(offset: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return offset;
    }
    (offset + alignment - 1) & !(alignment - 1)
}

/// Per-slot layout: size and alignment of the entry itself, whether an explicit alignment
/// override applied, and the entry's byte offset relative to its immediate parent aggregate (0
/// for a top-level entry).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TypeEntryLayout {
    /// Size in bytes.
    pub size: u64,
    /// Alignment in bytes, after any explicit override.
    pub alignment: u64,
    /// `true` if an explicit `_Alignas`-style override widened this entry's natural alignment.
    pub aligned: bool,
    /// Byte offset from the parent aggregate's start (0 at the top level, and always 0 for every
    /// member of a union).
    pub relative_offset: u64,
}

/// The layout of an entire [`IrType`]: one [`TypeEntryLayout`] per slot.
#[derive(Clone, Debug, Default)]
pub struct TypeLayout {
    entries: Vec<TypeEntryLayout>,
}

impl TypeLayout {
    /// Layout of the slot at `slot`.
    pub fn at(&self, slot: Slot) -> Result<&TypeEntryLayout> {
        self.entries
            .get(slot.index())
            .ok_or_else(|| error::out_of_bounds(format!("no layout entry for slot {}", slot)))
    }

    /// Number of entries (equal to the source type's slot count).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if there are no entries (the empty/void type).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn entry_alignment_override(entry: &TypeEntry) -> Option<u64> {
    if entry.alignment == 0 {
        None
    } else {
        Some(entry.alignment as u64)
    }
}

/// Compute the layout of every slot in `ty`, for `variant` in `context`. Unions take the maximum
/// member size/alignment and place every member at offset 0. Structs lay members out in
/// declaration order with padding for alignment; the struct's own size is the padded sum of its
/// members, rounded up to the struct's own alignment. Bitfields derive a synthetic size/alignment
/// from their base-type storage size and pack LSB-first within a shared allocation unit, handled
/// by the caller walking consecutive bitfield entries (this function assigns each bitfield the
/// size/alignment of its declared base-type allocation unit; packing position within the unit is
/// a codegen-time concern, not a layout concern, since multiple bitfields legitimately share one
/// offset).
pub fn calculate_type_layout(
    variant: Variant,
    _context: LayoutContext,
    ty: &IrType,
) -> Result<TypeLayout> {
    match variant {
        Variant::SystemV => {}
    }
    let mut layout = TypeLayout {
        entries: vec![
            TypeEntryLayout {
                size: 0,
                alignment: 1,
                aligned: false,
                relative_offset: 0,
            };
            ty.len()
        ],
    };
    layout_slot(ty, Slot::new(0), &mut layout)?;
    log::trace!("calculate_type_layout: {} entries, {} bytes", layout.entries.len(), layout.entries.first().map(|e| e.size).unwrap_or(0));
    Ok(layout)
}

/// Recursively compute the layout of the subtree rooted at `slot`, returning `(size, alignment)`
/// of that subtree so a caller laying out a parent aggregate can place the next member.
fn layout_slot(ty: &IrType, slot: Slot, layout: &mut TypeLayout) -> Result<(u64, u64)> {
    if slot.index() >= ty.len() {
        return Ok((0, 1));
    }
    let entry = *ty
        .entry(slot)
        .ok_or_else(|| error::invalid_parameter(format!("no type entry at slot {}", slot)))?;
    let alignment_override = entry_alignment_override(&entry);

    let (size, alignment) = match entry.typecode {
        TypeCode::Struct => layout_struct(ty, slot, &entry, layout)?,
        TypeCode::Union => layout_union(ty, slot, &entry, layout)?,
        TypeCode::Array => layout_array(ty, slot, &entry, layout)?,
        TypeCode::Bitfield => (entry.bitfield_base_size() as u64, entry.bitfield_base_size() as u64),
        _ => scalar_size_alignment(entry.typecode),
    };
    let effective_alignment = alignment_override.map(|a| a.max(alignment)).unwrap_or(alignment);
    layout.entries[slot.index()] = TypeEntryLayout {
        size,
        alignment: effective_alignment,
        aligned: alignment_override.is_some(),
        relative_offset: layout.entries[slot.index()].relative_offset,
    };
    Ok((size, effective_alignment))
}

fn layout_struct(
    ty: &IrType,
    slot: Slot,
    header: &TypeEntry,
    layout: &mut TypeLayout,
) -> Result<(u64, u64)> {
    let mut offset = 0u64;
    let mut max_alignment = 1u64;
    let mut child = Slot::new(slot.index() + 1);
    for _ in 0..header.child_count() {
        let (child_size, child_alignment) = layout_slot(ty, child, layout)?;
        offset = pad_aligned(offset, child_alignment);
        layout.entries[child.index()].relative_offset = offset;
        offset += child_size;
        max_alignment = max_alignment.max(child_alignment);
        child = ty.subtree_end(child);
    }
    let size = pad_aligned(offset, max_alignment);
    Ok((size, max_alignment))
}

fn layout_union(
    ty: &IrType,
    slot: Slot,
    header: &TypeEntry,
    layout: &mut TypeLayout,
) -> Result<(u64, u64)> {
    let mut max_size = 0u64;
    let mut max_alignment = 1u64;
    let mut child = Slot::new(slot.index() + 1);
    for _ in 0..header.child_count() {
        let (child_size, child_alignment) = layout_slot(ty, child, layout)?;
        layout.entries[child.index()].relative_offset = 0;
        max_size = max_size.max(child_size);
        max_alignment = max_alignment.max(child_alignment);
        child = ty.subtree_end(child);
    }
    Ok((pad_aligned(max_size, max_alignment), max_alignment))
}

fn layout_array(
    ty: &IrType,
    slot: Slot,
    header: &TypeEntry,
    layout: &mut TypeLayout,
) -> Result<(u64, u64)> {
    let element = Slot::new(slot.index() + 1);
    let (element_size, element_alignment) = layout_slot(ty, element, layout)?;
    layout.entries[element.index()].relative_offset = 0;
    Ok((element_size * header.param, element_alignment))
}

/// `calculate-type-properties`: the overall `(size, alignment)` of `ty`, computed by walking only
/// the top-level children and padding each by its own alignment, per spec — this is distinct from
/// `TypeLayout`'s per-slot view in that it is a summary query and does not require a prior layout
/// pass.
pub fn calculate_type_properties(ty: &IrType, layout: &TypeLayout) -> Result<(u64, u64)> {
    if ty.is_empty() {
        return Ok((0, 0));
    }
    let mut size = 0u64;
    let mut alignment = 1u64;
    let mut child = Slot::new(0);
    while child.index() < ty.len() {
        let entry_layout = layout.at(child)?;
        size = pad_aligned(size, entry_layout.alignment);
        size += entry_layout.size;
        alignment = alignment.max(entry_layout.alignment);
        child = ty.subtree_end(child);
    }
    Ok((size, alignment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_members_are_padded_and_offsets_align() {
        let mut ty = IrType::new();
        ty.push(TypeEntry::aggregate_header(TypeCode::Struct, 2));
        ty.push(TypeEntry::scalar(TypeCode::Char));
        ty.push(TypeEntry::scalar(TypeCode::I64));
        let layout = calculate_type_layout(Variant::SystemV, LayoutContext::Generic, &ty).unwrap();
        let s = layout.at(Slot::new(0)).unwrap();
        assert_eq!(s.size, 16);
        assert_eq!(s.alignment, 8);
        let int64 = layout.at(Slot::new(2)).unwrap();
        assert_eq!(int64.relative_offset, 8);
        assert_eq!(int64.relative_offset % int64.alignment, 0);
    }

    #[test]
    fn union_members_share_offset_zero_and_max_size() {
        let mut ty = IrType::new();
        ty.push(TypeEntry::aggregate_header(TypeCode::Union, 2));
        ty.push(TypeEntry::scalar(TypeCode::I32));
        ty.push(TypeEntry::scalar(TypeCode::F64));
        let layout = calculate_type_layout(Variant::SystemV, LayoutContext::Generic, &ty).unwrap();
        assert_eq!(layout.at(Slot::new(1)).unwrap().relative_offset, 0);
        assert_eq!(layout.at(Slot::new(2)).unwrap().relative_offset, 0);
        assert_eq!(layout.at(Slot::new(0)).unwrap().size, 8);
        assert_eq!(layout.at(Slot::new(0)).unwrap().alignment, 8);
    }

    #[test]
    fn long_double_is_sixteen_bytes() {
        let mut ty = IrType::new();
        ty.push(TypeEntry::scalar(TypeCode::LongDouble));
        let layout = calculate_type_layout(Variant::SystemV, LayoutContext::Generic, &ty).unwrap();
        let e = layout.at(Slot::new(0)).unwrap();
        assert_eq!(e.size, 16);
        assert_eq!(e.alignment, 16);
    }

    #[test]
    fn array_size_is_element_size_times_length() {
        let mut ty = IrType::new();
        ty.push(TypeEntry::array_header(10));
        ty.push(TypeEntry::scalar(TypeCode::I32));
        let layout = calculate_type_layout(Variant::SystemV, LayoutContext::Generic, &ty).unwrap();
        assert_eq!(layout.at(Slot::new(0)).unwrap().size, 40);
    }

    #[test]
    fn calculate_type_properties_matches_top_level_sum() {
        let mut ty = IrType::new();
        ty.push(TypeEntry::aggregate_header(TypeCode::Struct, 2));
        ty.push(TypeEntry::scalar(TypeCode::Char));
        ty.push(TypeEntry::scalar(TypeCode::I64));
        let layout = calculate_type_layout(Variant::SystemV, LayoutContext::Generic, &ty).unwrap();
        let (size, alignment) = calculate_type_properties(&ty, &layout).unwrap();
        assert_eq!((size, alignment), (16, 8));
    }
}
