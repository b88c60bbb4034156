//! # Shared Types
//!
//! Primitive identifiers and clock helpers used across Veilnet subsystems.
//!
//! ## Clusters
//!
//! - **Identity**: `Hash`, `IdentHash`, `TunnelId`
//! - **Wire type codes**: `SigTypeCode`, `EncTypeCode`, `StoreTypeCode`
//! - **Time**: millisecond/second epoch clocks in [`time`]

pub mod entities;
pub mod time;

pub use entities::{EncTypeCode, Hash, IdentHash, SigTypeCode, StoreTypeCode, TunnelId};
