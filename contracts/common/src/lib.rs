//! Silo Common Library
//!
//! Shared types, constants, errors and events for the silo ledger.
//!
//! The silo records deposits of value-bearing assets keyed by a per-asset
//! accrual index, accrues a time-weighted reward balance ("stalk") against
//! them and retires, converts and transfers them without creating or
//! destroying accrued value. This crate holds the parts every component
//! shares:
//!
//! - **Types**: accounts, positions, per-asset ledger state, flood records
//! - **Errors**: one error enum with stable codes
//! - **Math**: checked arithmetic and the accrual formulas
//! - **Events**: structured records for off-system indexing
//! - **Constants**: root issuance, precision, legacy defaults
//!
//! This crate is `no_std` compatible when built without the default `std`
//! feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export collections for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::{collections::BTreeMap, vec::Vec};
#[cfg(feature = "std")]
pub use std::{collections::BTreeMap, vec::Vec};

pub mod constants;
pub mod errors;
pub mod events;
pub mod math;
pub mod types;

// Re-exports for convenience
pub use errors::*;
pub use events::*;
pub use types::*;
