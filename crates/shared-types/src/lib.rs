//! # Shared Types Crate
//!
//! Chain and network identifiers used by every crate in the workspace.
//!
//! ## Design Principles
//!
//! - **Handles, not pointers**: blocks are referenced by [`BlockIndex`]
//!   values (hash, height, parent hash) that are resolved against the chain
//!   view on demand, never by references into chain-index memory.
//! - **Plain byte arrays**: hashes and identifiers are fixed-size arrays so
//!   they hash, compare and serialize without allocation.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
