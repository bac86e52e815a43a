//! Global and thread-local data initialisers.

use crate::stringpool::StringId;
use crate::types::{Slot, TypeId};
use std::collections::BTreeMap;

/// Where a data object lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Storage {
    /// Ordinary global storage.
    Global,
    /// Thread-local storage.
    ThreadLocal,
}

/// Character width of a string-literal value. The translator is expected to have already
/// resolved narrow-multibyte text to the host execution charset before it reaches this model;
/// `Mbchar` denotes that already-resolved byte-exact form, not a charset conversion still owed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Charset {
    /// Byte-exact narrow characters, already resolved to the host execution charset.
    Mbchar,
    /// UTF-16 code units.
    Utf16,
    /// UTF-32 code points.
    Utf32,
}

/// A symbol reference used by pointer-typed initialisers.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolRef {
    /// Interned name of the referenced identifier.
    pub name: StringId,
    /// Byte offset from the symbol's address.
    pub offset: i64,
}

/// One initialiser value, tagged by the kind of slot it fills.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    /// No initialiser; the slot is implicitly zero-filled when the data object is finalised.
    Undefined,
    /// An integer constant, truncated to the slot's scalar width.
    Integer(i64),
    /// A single-precision float constant.
    F32(f32),
    /// A double-precision float constant.
    F64(f64),
    /// A long-double constant, stored as its bit pattern (80-bit extended, 16-byte container).
    LongDouble(u128),
    /// A complex single-precision constant (real, imaginary).
    ComplexF32(f32, f32),
    /// A complex double-precision constant.
    ComplexF64(f64, f64),
    /// A complex long-double constant, each lane as its bit pattern.
    ComplexLongDouble(u128, u128),
    /// A string literal, tagged with its character width.
    String(StringId, Charset),
    /// A pointer to a named symbol plus a byte offset.
    Pointer(SymbolRef),
    /// A pointer into a string literal's storage.
    StringPointer(StringId, i64),
    /// Raw, uninterpreted bytes (e.g. for padding or opaque blobs).
    Raw(Vec<u8>),
    /// An aggregate initialiser: a marker that this slot's children carry their own values in the
    /// owning [`IrData`]'s value tree.
    Aggregate,
}

/// A global or thread-local data object: a typed, sparsely initialised value tree.
///
/// The tree is represented as a sorted map from slot to value rather than a vector parallel to
/// the type's entries, since most aggregate slots are implicitly zero and only a minority carry
/// an explicit initialiser. `finalized` governs whether further slots may be assigned.
pub struct IrData {
    storage: Storage,
    type_id: TypeId,
    total_length: u64,
    values: BTreeMap<Slot, DataValue>,
    finalized: bool,
}

impl IrData {
    /// Create a new, unfinalised data object of the given type and total byte length.
    pub fn new(storage: Storage, type_id: TypeId, total_length: u64) -> Self {
        IrData {
            storage,
            type_id,
            total_length,
            values: BTreeMap::new(),
            finalized: false,
        }
    }

    /// Storage class of this object.
    pub fn storage(&self) -> Storage {
        self.storage
    }

    /// The type describing this object's layout.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Total size in bytes of the object's storage.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// `true` once [`IrData::finalize`] has been called; no further values may be set.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Assign an explicit value to `slot`. Fails (by precondition; the caller checks
    /// [`IrData::is_finalized`]) if the object has already been finalised.
    pub fn set_value(&mut self, slot: Slot, value: DataValue) {
        debug_assert!(!self.finalized, "cannot mutate a finalized data object");
        self.values.insert(slot, value);
    }

    /// Look up the explicit value at `slot`, if any was assigned.
    pub fn value(&self, slot: Slot) -> Option<&DataValue> {
        self.values.get(&slot)
    }

    /// Mark the object as complete. Slots without an explicit value are implicitly zero when a
    /// consumer walks the finalised tree.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Iterate explicitly assigned `(slot, value)` pairs in ascending slot order, skipping the
    /// implicit zero-fill gaps between them. This is the "skip-to" iteration the value tree
    /// supports: a consumer walking slots in order treats any slot missing from this iteration as
    /// zero-initialised.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &DataValue)> {
        self.values.iter().map(|(&s, v)| (s, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ssacc_entity::EntityRef;

    #[test]
    fn unset_slots_are_absent_until_finalized() {
        let mut data = IrData::new(Storage::Global, TypeId::new(0), 16);
        assert!(data.value(Slot::new(0)).is_none());
        data.set_value(Slot::new(0), DataValue::Integer(42));
        assert_eq!(data.value(Slot::new(0)), Some(&DataValue::Integer(42)));
        assert!(!data.is_finalized());
        data.finalize();
        assert!(data.is_finalized());
    }

    #[test]
    fn iteration_skips_gaps() {
        let mut data = IrData::new(Storage::Global, TypeId::new(0), 32);
        data.set_value(Slot::new(0), DataValue::Integer(1));
        data.set_value(Slot::new(5), DataValue::Integer(2));
        let slots: Vec<_> = data.iter().map(|(s, _)| s).collect();
        assert_eq!(slots, vec![Slot::new(0), Slot::new(5)]);
    }
}
