//! Fixed-width arbitrary-precision integer primitives.
//!
//! Every routine here operates on a caller-owned slice of [`digits::Digit`], sized by
//! [`digits::digit_count`] for a given bit width, and never allocates on its own. This crate
//! backs the `_BitInt(N)` family of opcodes for widths that don't fit a native machine register.

pub mod arith;
pub mod compare;
pub mod digits;
pub mod float;
pub mod mul;
pub mod shift;

pub use arith::{
    add, cast_signed, cast_unsigned, copy, get_signed_value, get_unsigned_value, invert, negate,
    set_signed_int, set_unsigned_int, subtract, zero,
};
pub use compare::{leading_zeros, least_significant_nonzero, signed_compare, trailing_zeros,
    unsigned_compare};
pub use digits::{digit_count, low_mask, mask_to_width, sign_bit_set, Digit, DIGIT_BITS};
pub use float::{signed_to_double, signed_to_single};
pub use mul::{signed_multiply, unsigned_multiply};
pub use shift::{arithmetic_right_shift, shift_left, shift_right};
