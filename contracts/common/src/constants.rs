//! Protocol Constants
//!
//! Fixed numbers shared by every ledger component. Per-asset parameters
//! (stalk per value, accrual rate, legacy ratio) are not constants: they are
//! supplied in [`crate::types::AssetConfig`] when an asset is whitelisted.

/// Root issuance
pub mod roots {
    /// Roots minted per stalk when the silo holds no roots yet (1e12)
    pub const ROOTS_BASE: u128 = 1_000_000_000_000;
}

/// Stalk issuance defaults
pub mod stalk {
    /// Default stalk minted per unit of deposited value
    pub const DEFAULT_STALK_PER_VALUE: u128 = 10_000;

    /// Default accrual-index growth per epoch for a freshly whitelisted asset
    pub const DEFAULT_ACCRUAL_RATE: i128 = 2;
}

/// Precision constants
pub mod precision {
    /// Precision of the cumulative flood payout-per-root index (1e30).
    /// Total roots run at `ROOTS_BASE` per stalk, so the index must resolve
    /// payouts far smaller than the roots supply.
    pub const FLOOD_PRECISION: u128 = 1_000_000_000_000_000_000_000_000_000_000;
}

/// Legacy (epoch-keyed) position format
pub mod legacy {
    /// Default accrual-index distance between two consecutive legacy epochs
    pub const DEFAULT_LEGACY_RATE: i128 = 2;

    /// Upper bound on how far before the migration epoch a legacy position
    /// may have been recorded. Synthetic indices are disjoint from indices
    /// stamped by deposits for every epoch inside this horizon.
    pub const MIGRATION_HORIZON_EPOCHS: u64 = 1_000_000;
}

/// Operation limits
pub mod limits {
    /// Maximum number of positions touched by one multi-position call
    pub const MAX_POSITIONS_PER_CALL: usize = 256;

    /// Maximum number of whitelisted assets
    pub const MAX_ASSETS: usize = 64;
}
