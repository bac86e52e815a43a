//! Unsigned and signed comparison, and simple bit-counting queries.

use crate::digits::{digit_count, sign_bit_set, Digit, DIGIT_BITS};
use core::cmp::Ordering;

fn ordering_to_i32(o: Ordering) -> i32 {
    match o {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// Unsigned comparison of two `width`-bit values, returning -1, 0 or 1.
pub fn unsigned_compare(lhs: &[Digit], rhs: &[Digit], width: u32) -> i32 {
    let n = digit_count(width);
    for i in (0..n).rev() {
        match lhs[i].cmp(&rhs[i]) {
            Ordering::Equal => continue,
            other => return ordering_to_i32(other),
        }
    }
    0
}

/// Signed comparison of two `width`-bit values, returning -1, 0 or 1.
pub fn signed_compare(lhs: &[Digit], rhs: &[Digit], width: u32) -> i32 {
    let lneg = sign_bit_set(lhs, width);
    let rneg = sign_bit_set(rhs, width);
    if lneg != rneg {
        return if lneg { -1 } else { 1 };
    }
    unsigned_compare(lhs, rhs, width)
}

/// Number of leading zero bits within the `width`-bit value.
pub fn leading_zeros(digits: &[Digit], width: u32) -> u32 {
    let n = digit_count(width);
    if n == 0 {
        return 0;
    }
    let top_width = width - (n as u32 - 1) * DIGIT_BITS;
    let mut count = 0u32;
    for i in (0..n).rev() {
        let bits = if i == n - 1 { top_width } else { DIGIT_BITS };
        let d = digits[i];
        if d == 0 {
            count += bits;
            continue;
        }
        let lz = d.leading_zeros().saturating_sub(DIGIT_BITS - bits);
        count += lz;
        break;
    }
    count
}

/// Number of trailing zero bits within the `width`-bit value (returns `width` if all zero).
pub fn trailing_zeros(digits: &[Digit], width: u32) -> u32 {
    let n = digit_count(width);
    let mut count = 0u32;
    for i in 0..n {
        let d = digits[i];
        if d == 0 {
            count += DIGIT_BITS;
            continue;
        }
        count += d.trailing_zeros();
        return count.min(width);
    }
    width
}

/// Index (from the LSB, 1-based) of the least-significant set bit, or 0 if the value is zero.
/// Matches the C `ffs` convention.
pub fn least_significant_nonzero(digits: &[Digit], width: u32) -> u32 {
    let tz = trailing_zeros(digits, width);
    if tz >= width {
        0
    } else {
        tz + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arith::set_unsigned_int;

    #[test]
    fn compares() {
        let w = 16u32;
        let n = digit_count(w);
        let mut a = vec![0u64; n];
        let mut b = vec![0u64; n];
        set_unsigned_int(&mut a, w, 10);
        set_unsigned_int(&mut b, w, 20);
        assert_eq!(unsigned_compare(&a, &b, w), -1);
        assert_eq!(unsigned_compare(&b, &a, w), 1);
        assert_eq!(unsigned_compare(&a, &a, w), 0);
    }

    #[test]
    fn leading_trailing_zeros() {
        let w = 32u32;
        let n = digit_count(w);
        let mut a = vec![0u64; n];
        set_unsigned_int(&mut a, w, 0b1000);
        assert_eq!(trailing_zeros(&a, w), 3);
        assert_eq!(leading_zeros(&a, w), 28);
        assert_eq!(least_significant_nonzero(&a, w), 4);
    }

    #[test]
    fn zero_has_width_trailing_zeros() {
        let w = 8u32;
        let n = digit_count(w);
        let a = vec![0u64; n];
        assert_eq!(trailing_zeros(&a, w), w);
        assert_eq!(leading_zeros(&a, w), w);
        assert_eq!(least_significant_nonzero(&a, w), 0);
    }
}
