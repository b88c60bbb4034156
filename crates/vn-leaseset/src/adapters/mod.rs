//! # Adapters Layer
//!
//! Concrete implementations of outbound ports owned by this crate.

pub mod identity;
