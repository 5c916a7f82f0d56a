//! # Input and value model
//!
//! The CFG the compiler consumes ([`cfg`], [`node`], [`operand`]) and the
//! runtime [`value::Value`] both sides share.
//!
//! ## Conventions
//!
//! - Blocks and operands are referenced by arena id, never by pointer.
//! - Node `type_name`s follow the `Category_Name` spelling used by CFG dumps.

pub mod cfg;
pub mod node;
pub mod operand;
pub mod value;
