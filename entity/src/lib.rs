//! Densely numbered entity references.
//!
//! This crate supplies the small-index arena types that back every owned, cyclic data structure
//! in the optimizer and the AMD64 backend: `PrimaryMap` allocates dense keys, `SecondaryMap`
//! attaches side tables to an existing key space, and `EntitySet` tracks membership. The
//! `ReservedValue` contract those tables build on lives in `packed_option`.

#![deny(missing_docs)]

pub mod entity_ref;
mod iter;
mod keys;
mod map;
pub mod packed_option;
mod set;

pub use crate::entity_ref::EntityRef;
pub use crate::iter::{Iter, IterMut};
pub use crate::keys::Keys;
pub use crate::map::{PrimaryMap, SecondaryMap};
pub use crate::packed_option::ReservedValue;
pub use crate::set::EntitySet;
