//! Error Types for the Silo Ledger
//!
//! Every failure aborts the whole operation; nothing is retried internally.
//! Variants carry the offending operand so callers can surface it.

use core::fmt;

use crate::types::{AccrualIndex, Address, AssetId, Epoch};

/// Result type alias for silo operations
pub type SiloResult<T> = Result<T, SiloError>;

/// Main error enum for all silo ledger errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiloError {
    // ============ Position Errors ============
    /// Position created with non-positive value or quantity
    InvalidPosition {
        asset: AssetId,
        quantity: u128,
        value: u128,
    },

    /// Removal exceeds what the position holds and no legacy fallback applies
    InsufficientBalance {
        account: Address,
        asset: AssetId,
        index: AccrualIndex,
        available: u128,
        requested: u128,
    },

    /// Parallel argument sequences differ in length
    LengthMismatch { indices: usize, amounts: usize },

    /// Too many positions in one call
    TooManyPositions { count: usize, maximum: usize },

    // ============ Conversion Errors ============
    /// Removed quantity does not match the requested total
    InsufficientRemoved { requested: u128, removed: u128 },

    /// Conversion would create a position without value or quantity
    ZeroValueConversion {
        asset: AssetId,
        quantity: u128,
        value: u128,
    },

    // ============ Accrual Errors ============
    /// A position mutation ran before pending reward was realized.
    /// Contract violation inside the ledger, never a user error.
    StaleAccrual {
        account: Address,
        asset: AssetId,
        realized_index: AccrualIndex,
        current_index: AccrualIndex,
    },

    /// Nothing to claim
    NothingToClaim { account: Address },

    // ============ Asset Errors ============
    /// Asset is not whitelisted
    UnknownAsset { asset: AssetId },

    /// Asset already whitelisted
    AssetAlreadyWhitelisted { asset: AssetId },

    /// Asset no longer accepts deposits
    DepositsDisabled { asset: AssetId },

    /// Asset has no legacy format
    NoLegacyFormat { asset: AssetId },

    /// Epoch is outside the legacy range of the asset
    NotLegacyEpoch { asset: AssetId, epoch: Epoch },

    // ============ Flood Errors ============
    /// A flood payout was reported while no flood is active
    FloodNotActive { epoch: Epoch },

    // ============ Execution Errors ============
    /// A mutating call was made while another one is in progress
    Reentrancy,

    /// External asset transfer failed
    TransferFailed {
        asset: AssetId,
        to: Address,
        quantity: u128,
    },

    /// Invalid configuration
    InvalidConfig { reason: &'static str },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,
}

impl SiloError {
    /// Returns a stable error code for logging/indexing
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPosition { .. } => "E001_INVALID_POSITION",
            Self::InsufficientBalance { .. } => "E002_INSUFFICIENT_BALANCE",
            Self::LengthMismatch { .. } => "E003_LENGTH_MISMATCH",
            Self::TooManyPositions { .. } => "E004_TOO_MANY_POSITIONS",
            Self::InsufficientRemoved { .. } => "E010_INSUFFICIENT_REMOVED",
            Self::ZeroValueConversion { .. } => "E011_ZERO_VALUE_CONVERSION",
            Self::StaleAccrual { .. } => "E020_STALE_ACCRUAL",
            Self::NothingToClaim { .. } => "E021_NOTHING_TO_CLAIM",
            Self::UnknownAsset { .. } => "E030_UNKNOWN_ASSET",
            Self::AssetAlreadyWhitelisted { .. } => "E031_ASSET_EXISTS",
            Self::DepositsDisabled { .. } => "E032_DEPOSITS_DISABLED",
            Self::NoLegacyFormat { .. } => "E033_NO_LEGACY_FORMAT",
            Self::NotLegacyEpoch { .. } => "E034_NOT_LEGACY_EPOCH",
            Self::FloodNotActive { .. } => "E040_FLOOD_NOT_ACTIVE",
            Self::Reentrancy => "E050_REENTRANCY",
            Self::TransferFailed { .. } => "E051_TRANSFER_FAILED",
            Self::InvalidConfig { .. } => "E052_INVALID_CONFIG",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
        }
    }

    /// Returns true if this error is recoverable (user can fix it)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidPosition { .. }
                | Self::InsufficientBalance { .. }
                | Self::LengthMismatch { .. }
                | Self::TooManyPositions { .. }
                | Self::ZeroValueConversion { .. }
                | Self::NothingToClaim { .. }
                | Self::TransferFailed { .. }
        )
    }
}

/// First bytes of an id in hex, enough to tell accounts and assets apart
struct ShortId<'a>(&'a [u8; 32]);

impl fmt::Display for ShortId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..4] {
            write!(f, "{:02x}", byte)?;
        }
        f.write_str("..")
    }
}

impl fmt::Display for SiloError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPosition {
                asset,
                quantity,
                value,
            } => write!(
                f,
                "{}: position in asset {} needs positive quantity and value (quantity {}, value {})",
                self.code(),
                ShortId(asset),
                quantity,
                value
            ),
            Self::InsufficientBalance {
                account,
                asset,
                index,
                available,
                requested,
            } => write!(
                f,
                "{}: account {} asset {} position at index {} holds {}, requested {}",
                self.code(),
                ShortId(account),
                ShortId(asset),
                index,
                available,
                requested
            ),
            Self::LengthMismatch { indices, amounts } => write!(
                f,
                "{}: {} indices but {} amounts",
                self.code(),
                indices,
                amounts
            ),
            Self::InsufficientRemoved { requested, removed } => write!(
                f,
                "{}: requested {} but removed {}",
                self.code(),
                requested,
                removed
            ),
            Self::StaleAccrual {
                account,
                asset,
                realized_index,
                current_index,
            } => write!(
                f,
                "{}: account {} asset {} realized through index {}, current index {}",
                self.code(),
                ShortId(account),
                ShortId(asset),
                realized_index,
                current_index
            ),
            Self::TransferFailed { quantity, .. } => {
                write!(f, "{}: transfer of {} failed", self.code(), quantity)
            }
            Self::UnknownAsset { asset } | Self::DepositsDisabled { asset } => {
                write!(f, "{}: asset {}", self.code(), ShortId(asset))
            }
            Self::InvalidConfig { reason } => write!(f, "{}: {}", self.code(), reason),
            _ => f.write_str(self.code()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SiloError {}
