//! Inline arithmetic and comparison fast paths.
//!
//! When both operands of a numeric operation are inline-encoded, the result
//! can be computed on this side of the ABI without crossing into the host
//! runtime. The functions here only *classify and compute*; routing the
//! [`FastPath::Fallback`] outcome to the slow path is the bridge's job.
//!
//! Promotion follows the host runtime exactly:
//! - int ⊕ int stays int, computed in `i64`; a result outside the inline
//!   i32 range falls back instead of truncating (the slow path owns the
//!   full numeric domain);
//! - any double operand promotes the operation to double;
//! - division is true division (always a double); a zero divisor is a
//!   domain error reported without consulting the slow path;
//! - mixed int/double comparisons compare as doubles.

use crate::codec::{self, RawHandle};

/// Outcome of attempting an operation on the fast path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FastPath<T> {
    /// Both operands were inline; the result was computed locally.
    Computed(T),
    /// Both operands were inline and the divisor was zero. The caller must
    /// surface the domain's divide-by-zero error.
    DivideByZero,
    /// At least one operand is not inline-decodable; the slow path must
    /// perform the operation.
    Fallback,
}

/// Comparison operators mirrored from the host runtime's rich comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
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

/// An inline-decodable operand.
#[derive(Clone, Copy)]
enum Num {
    Int(i32),
    Double(f64),
}

impl Num {
    #[inline]
    fn decode(handle: RawHandle) -> Option<Num> {
        if handle.is_inline_int() {
            Some(Num::Int(codec::decode_int(handle)))
        } else if handle.is_inline_double() {
            Some(Num::Double(codec::decode_double(handle)))
        } else {
            None
        }
    }

    #[inline]
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Double(d) => d,
        }
    }

    #[inline]
    fn is_zero(self) -> bool {
        match self {
            Num::Int(n) => n == 0,
            Num::Double(d) => d == 0.0,
        }
    }
}

/// Encode an `i64` intermediate result, falling back when it does not
/// survive re-encoding as an inline i32.
#[inline]
fn encode_i64(value: i64) -> FastPath<RawHandle> {
    match i32::try_from(value) {
        Ok(n) => FastPath::Computed(codec::encode_int(n)),
        Err(_) => FastPath::Fallback,
    }
}

macro_rules! binary_fast_path {
    ($name:ident, $int_op:ident, $float_op:tt, $doc:literal) => {
        #[doc = $doc]
        #[inline]
        pub fn $name(lhs: RawHandle, rhs: RawHandle) -> FastPath<RawHandle> {
            let (Some(a), Some(b)) = (Num::decode(lhs), Num::decode(rhs)) else {
                return FastPath::Fallback;
            };
            match (a, b) {
                (Num::Int(x), Num::Int(y)) => encode_i64((x as i64).$int_op(y as i64)),
                _ => FastPath::Computed(codec::encode_double(a.as_f64() $float_op b.as_f64())),
            }
        }
    };
}

binary_fast_path!(
    add,
    wrapping_add,
    +,
    "Fast-path addition. Integer results outside the inline range fall back."
);
binary_fast_path!(
    sub,
    wrapping_sub,
    -,
    "Fast-path subtraction. Integer results outside the inline range fall back."
);
binary_fast_path!(
    mul,
    wrapping_mul,
    *,
    "Fast-path multiplication. Integer results outside the inline range fall back."
);

/// Fast-path true division.
///
/// Always produces a double, matching the host runtime's promotion rule. A
/// zero divisor (inline int `0` or double `±0.0`) reports
/// [`FastPath::DivideByZero`] without crossing the boundary.
#[inline]
pub fn div(lhs: RawHandle, rhs: RawHandle) -> FastPath<RawHandle> {
    let (Some(a), Some(b)) = (Num::decode(lhs), Num::decode(rhs)) else {
        return FastPath::Fallback;
    };
    if b.is_zero() {
        return FastPath::DivideByZero;
    }
    FastPath::Computed(codec::encode_double(a.as_f64() / b.as_f64()))
}

/// Fast-path rich comparison.
///
/// Int/int pairs compare exactly; any double operand promotes the
/// comparison to doubles (IEEE semantics, so NaN compares false for
/// everything but `!=`).
#[inline]
pub fn compare(op: CompareOp, lhs: RawHandle, rhs: RawHandle) -> FastPath<bool> {
    let (Some(a), Some(b)) = (Num::decode(lhs), Num::decode(rhs)) else {
        return FastPath::Fallback;
    };
    let result = match (a, b) {
        (Num::Int(x), Num::Int(y)) => match op {
            CompareOp::Eq => x == y,
            CompareOp::Ne => x != y,
            CompareOp::Lt => x < y,
            CompareOp::Le => x <= y,
            CompareOp::Gt => x > y,
            CompareOp::Ge => x >= y,
        },
        _ => {
            let (x, y) = (a.as_f64(), b.as_f64());
            match op {
                CompareOp::Eq => x == y,
                CompareOp::Ne => x != y,
                CompareOp::Lt => x < y,
                CompareOp::Le => x <= y,
                CompareOp::Gt => x > y,
                CompareOp::Ge => x >= y,
            }
        }
    };
    FastPath::Computed(result)
}
