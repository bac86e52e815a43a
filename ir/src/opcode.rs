//! The closed opcode enum shared by the legacy bytecode function body and, via
//! `ssacc-optimizer`, SSA instructions.
//!
//! An [`Opcode`] only names *what* an instruction does; it carries no operands itself. A full
//! instruction pairs an opcode with a small fixed set of operand references (the generic `R` in
//! [`Instruction`]) and a [`Param`] holding whichever immediate/type/block/symbol data that
//! opcode needs. Operand count and shape per opcode is documented on the variant.

use crate::stringpool::StringId;
use crate::types::TypeId;
use smallvec::SmallVec;

/// Integer width an arithmetic, conversion or comparison opcode operates at.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IntWidth {
    /// 8-bit.
    W8,
    /// 16-bit.
    W16,
    /// 32-bit.
    W32,
    /// 64-bit.
    W64,
    /// Arbitrary-precision, backed by `ssacc-bigint`; the width in bits is carried in `Param`.
    BigInt,
}

/// Floating-point width an arithmetic or conversion opcode operates at.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FloatWidth {
    /// IEEE single precision.
    F32,
    /// IEEE double precision.
    F64,
    /// Platform long double (x87 extended precision).
    LongDouble,
}

/// The atomic read-modify-write operation a `fetch-op` opcode performs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AtomicRmwOp {
    /// Fetch-and-add.
    Add,
    /// Fetch-and-subtract.
    Sub,
    /// Fetch-and-and.
    And,
    /// Fetch-and-or.
    Or,
    /// Fetch-and-xor.
    Xor,
}

/// A bit-manipulation builtin family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BitBuiltin {
    /// Count leading zeros.
    Clz,
    /// Count trailing zeros.
    Ctz,
    /// Population count.
    Popcount,
    /// Bit parity (popcount mod 2).
    Parity,
    /// `ffs`: index of the least-significant set bit, 1-based, 0 if none.
    Ffs,
    /// Count leading redundant sign bits.
    Clrsb,
}

/// The closed opcode enum. Variants are grouped to match the families named in the design: constants,
/// memory, arithmetic, conversions, comparisons, control flow, phi/select, overflow-checked
/// arithmetic, atomics, builtins, and the tail-call/debug markers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    // --- constants: 0 operands, value in `Param` ---
    /// Integer constant of the width carried in `Param::Int`.
    ConstInt,
    /// `f32` constant.
    ConstF32,
    /// `f64` constant.
    ConstF64,
    /// `long double` constant.
    ConstLongDouble,
    /// Reference to a string literal in the module's string pool.
    ConstStringRef,
    /// Reference to a global/function symbol by name.
    ConstSymbolRef,

    // --- memory: operands vary ---
    /// Load from the address in operand 0.
    Load,
    /// Store operand 1's value to the address in operand 0.
    Store,
    /// Allocate a local of the type named in `Param::Type`. 0 operands.
    AllocLocal,
    /// Marks the lifetime begin/end of operand 0, a prior `alloc-local`. Has no semantic effect
    /// of its own; `Param::Int` distinguishes begin (0) from end (1).
    LocalLifetimeMark,

    // --- arithmetic: 2 operands unless noted ---
    /// Integer add.
    IntAdd,
    /// Integer subtract.
    IntSub,
    /// Integer multiply.
    IntMul,
    /// Integer divide.
    IntDiv,
    /// Integer remainder.
    IntMod,
    /// Float add.
    FloatAdd,
    /// Float subtract.
    FloatSub,
    /// Float multiply.
    FloatMul,
    /// Float divide.
    FloatDiv,
    /// Bitwise and.
    BitAnd,
    /// Bitwise or.
    BitOr,
    /// Bitwise xor.
    BitXor,
    /// Logical (unsigned) shift left.
    ShiftLeft,
    /// Logical (unsigned) shift right.
    ShiftRight,
    /// Arithmetic (sign-preserving) shift right.
    ArithShiftRight,
    /// Integer negate. 1 operand.
    IntNeg,
    /// Float negate. 1 operand.
    FloatNeg,
    /// Bitwise complement. 1 operand.
    BitNot,
    /// Logical (boolean) not. 1 operand.
    BoolNot,

    // --- conversions: 1 operand ---
    /// Integer-to-integer conversion; `Param` carries the source/destination width and signedness.
    IntToInt,
    /// Integer-to-float conversion.
    IntToFloat,
    /// Float-to-integer conversion.
    FloatToInt,
    /// Float-to-float conversion.
    FloatToFloat,

    // --- comparisons: 2 operands, result is a boolean-valued integer ---
    /// Signed integer comparison; `Param::Int` carries the `CmpOp` discriminant.
    IntCompareSigned,
    /// Unsigned integer comparison.
    IntCompareUnsigned,
    /// Ordered float comparison (false if either operand is NaN).
    FloatCompareOrdered,
    /// Unordered float comparison (true if either operand is NaN).
    FloatCompareUnordered,

    // --- control: terminators unless noted ---
    /// Unconditional jump. 0 value operands; target in `Param::Block`.
    Jump,
    /// Conditional branch on operand 0; `Param` carries the two target blocks' encoding.
    Branch,
    /// Multi-way branch on operand 0 against a jump table recorded out-of-line.
    Switch,
    /// Return operand 0 (or no operand for a void function).
    Return,
    /// Call `Param::Symbol` with the trailing operands as arguments.
    Invoke,
    /// Inline assembly; see `ssacc-optimizer`'s `InlineAsmBinding` for the parameter bindings.
    InlineAsm,
    /// Marks a program point statically known to be unreachable. Non-fallthrough.
    Unreachable,

    /// Phi node. Not a terminator; lives in the block's phi list, not its instruction list.
    Phi,
    /// Select operand 1 or operand 2 based on operand 0, without branching.
    Select,

    // --- overflow-checked arithmetic: 2 operands, logical result is (value, overflow) ---
    /// Checked signed add.
    CheckedSignedAdd,
    /// Checked unsigned add.
    CheckedUnsignedAdd,
    /// Checked signed subtract.
    CheckedSignedSub,
    /// Checked unsigned subtract.
    CheckedUnsignedSub,
    /// Checked signed multiply.
    CheckedSignedMul,
    /// Checked unsigned multiply.
    CheckedUnsignedMul,

    // --- atomics: operand 0 is always the address ---
    /// Atomic load.
    AtomicLoad,
    /// Atomic store; operand 1 is the value.
    AtomicStore,
    /// Atomic exchange; operand 1 is the new value, result is the old value.
    AtomicExchange,
    /// Atomic compare-exchange; operand 1 expected, operand 2 desired.
    AtomicCompareExchange,
    /// Atomic fetch-and-op; `Param::Int` selects the `AtomicRmwOp`, operand 1 is the operand.
    AtomicFetchOp,

    // --- builtins ---
    /// Classify a type's ABI register class at runtime (used by `<stdarg.h>` helpers).
    BuiltinClassifyType,
    /// `clz`/`ctz`/`popcount`/`parity`/`ffs`/`clrsb`; `Param::Int` selects the `BitBuiltin`.
    BuiltinBitOp,
    /// `stdc_*` bit-utility family (C23 `<stdbit.h>`).
    BuiltinStdcBits,

    /// Marks an `invoke` as eligible for tail-call lowering. Not itself a terminator; decorates
    /// the preceding `invoke`.
    TailCallMarker,
    /// Associates the current program point with a source-level local variable for debug info.
    LocalVariableDebugMarker,
}

impl Opcode {
    /// `true` for opcodes that end a block's instruction stream.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jump
                | Opcode::Branch
                | Opcode::Switch
                | Opcode::Return
                | Opcode::Unreachable
        )
    }

    /// `true` for opcodes whose effect is observable even with no uses (so dead-code elimination
    /// must not remove them): stores, calls, inline-asm, atomics, and the markers.
    pub fn has_side_effect(self) -> bool {
        matches!(
            self,
            Opcode::Store
                | Opcode::Invoke
                | Opcode::InlineAsm
                | Opcode::AtomicStore
                | Opcode::AtomicExchange
                | Opcode::AtomicCompareExchange
                | Opcode::AtomicFetchOp
                | Opcode::AtomicLoad
                | Opcode::LocalLifetimeMark
                | Opcode::LocalVariableDebugMarker
                | Opcode::TailCallMarker
        ) || self.is_terminator()
    }
}

/// Ordered comparison predicate for `IntCompareSigned`/`IntCompareUnsigned`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// The compact parameter union an [`Opcode`] may carry alongside its operand references.
#[derive(Clone, Debug, PartialEq)]
pub enum Param {
    /// No additional data.
    None,
    /// An immediate integer (constant value, comparison predicate ordinal, bit width, ...).
    Int(i64),
    /// An immediate `f32`.
    F32(f32),
    /// An immediate `f64`.
    F64(f64),
    /// An immediate `long double` bit pattern.
    LongDouble(u128),
    /// A single block target, encoded as the target block's raw index (`Jump`). Carried as a
    /// bare `u32` rather than an optimizer `Block` so this crate need not depend on the optimizer;
    /// `ssacc-optimizer` round-trips it through `Block::new`/`EntityRef::index`.
    Block(u32),
    /// A pair of block targets, encoded as raw indices: `(true-target, false-target)` (`Branch`).
    BlockPair(u32, u32),
    /// An index into the container's out-of-line switch-table store (`Switch`).
    SwitchTable(u32),
    /// A reference to a module type.
    Type(TypeId),
    /// A reference to an interned symbol name.
    Symbol(StringId),
    /// A reference to an interned string literal.
    StringLiteral(StringId),
    /// Memory-access flags (volatile, alignment hint, address space), packed as one word.
    MemoryFlags(u32),
    /// Integer width tag for a width-polymorphic opcode.
    IntWidth(IntWidth),
    /// Float width tag for a width-polymorphic opcode.
    FloatWidth(FloatWidth),
    /// Comparison predicate for `IntCompareSigned`/`IntCompareUnsigned`.
    Compare(CmpOp),
    /// Atomic read-modify-write operation selector.
    AtomicRmw(AtomicRmwOp),
    /// Bit-builtin family selector.
    BitBuiltin(BitBuiltin),
}

/// A fixed-capacity list of operand references; most opcodes need 0-3 operands, so this avoids a
/// heap allocation in the common case while still handling `switch`/`invoke`'s variable arity.
pub type OperandList<R> = SmallVec<[R; 3]>;

/// One instruction: an opcode, its operand references, and its parameter data. Generic over the
/// operand-reference type so the legacy bytecode body and the optimizer's SSA form can share this
/// definition while using different reference representations (the legacy form references
/// earlier stack-machine results by relative depth; SSA references a `Value`).
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction<R> {
    /// What this instruction does.
    pub opcode: Opcode,
    /// The values (or, for the legacy form, stack positions) this instruction reads.
    pub operands: OperandList<R>,
    /// The compact immediate/reference data this opcode needs.
    pub param: Param,
}

impl<R> Instruction<R> {
    /// Build an instruction with no operands.
    pub fn nullary(opcode: Opcode, param: Param) -> Self {
        Instruction {
            opcode,
            operands: OperandList::new(),
            param,
        }
    }

    /// Build a one-operand instruction.
    pub fn unary(opcode: Opcode, operand: R, param: Param) -> Self {
        let mut operands = OperandList::new();
        operands.push(operand);
        Instruction {
            opcode,
            operands,
            param,
        }
    }

    /// Build a two-operand instruction.
    pub fn binary(opcode: Opcode, lhs: R, rhs: R, param: Param) -> Self {
        let mut operands = OperandList::new();
        operands.push(lhs);
        operands.push(rhs);
        Instruction {
            opcode,
            operands,
            param,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminators_are_closed_and_disjoint_from_phi() {
        assert!(Opcode::Jump.is_terminator());
        assert!(Opcode::Return.is_terminator());
        assert!(!Opcode::Phi.is_terminator());
        assert!(!Opcode::IntAdd.is_terminator());
    }

    #[test]
    fn side_effects_include_stores_and_terminators_not_pure_arith() {
        assert!(Opcode::Store.has_side_effect());
        assert!(Opcode::Return.has_side_effect());
        assert!(!Opcode::IntAdd.has_side_effect());
        assert!(!Opcode::Phi.has_side_effect());
    }

    #[test]
    fn binary_instruction_carries_both_operands() {
        let instr: Instruction<u32> = Instruction::binary(Opcode::IntAdd, 1, 2, Param::None);
        assert_eq!(&instr.operands[..], &[1, 2]);
    }
}
