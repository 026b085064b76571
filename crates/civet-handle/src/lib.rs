//! # Civet handle encoding
//!
//! Tagged 64-bit handle words for the extension ABI, plus the inline
//! arithmetic fast paths that avoid a boundary crossing when both operands
//! are inline-encoded primitives.
//!
//! The bit-level packing lives entirely in [`codec`]; everything else in the
//! workspace manipulates handles through [`RawHandle`] and the
//! [`HandleValue`] sum type.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod arith;
pub mod codec;

pub use arith::{CompareOp, FastPath};
pub use codec::{HandleValue, RawHandle, SINGLETON_LIMIT};
