//! Ledger Events
//!
//! Every mutating call emits records of what changed so that an
//! off-system indexer can mirror the ledger without reading its state.

use crate::types::{AccrualIndex, Address, AssetId, Epoch, PositionId};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Position Events (0x01 - 0x1F)
    PositionAdded = 0x01,
    PositionRemoved = 0x02,
    PositionTransferred = 0x03,
    LegacyPositionImported = 0x04,
    LegacyPositionMigrated = 0x05,

    // Balance Events (0x20 - 0x3F)
    StalkChanged = 0x20,
    Planted = 0x21,
    Converted = 0x22,

    // Flood Events (0x40 - 0x5F)
    FloodStarted = 0x40,
    FloodPaid = 0x41,
    FloodEnded = 0x42,
    FloodPayoutClaimed = 0x43,

    // Protocol Events (0x80 - 0x9F)
    EpochAdvanced = 0x80,
    EarnedRewardReceived = 0x81,
    AssetWhitelisted = 0x82,
    AssetDewhitelisted = 0x83,
    AccrualRateChanged = 0x84,
}

/// Main event enum containing all ledger events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum SiloEvent {
    // ============ Position Events ============

    /// A position was created or grown
    PositionAdded {
        position_id: PositionId,
        account: Address,
        asset: AssetId,
        index: AccrualIndex,
        quantity: u128,
        value: u128,
        epoch: Epoch,
    },

    /// A position was reduced or deleted
    PositionRemoved {
        position_id: PositionId,
        account: Address,
        asset: AssetId,
        index: AccrualIndex,
        quantity: u128,
        value: u128,
        epoch: Epoch,
    },

    /// A position moved between accounts
    PositionTransferred {
        from: Address,
        to: Address,
        asset: AssetId,
        index: AccrualIndex,
        quantity: u128,
        value: u128,
        epoch: Epoch,
    },

    /// A legacy position was seeded into the legacy store
    LegacyPositionImported {
        account: Address,
        asset: AssetId,
        legacy_epoch: Epoch,
        index: AccrualIndex,
        quantity: u128,
        value: u128,
        epoch: Epoch,
    },

    /// A legacy position moved into the current store
    LegacyPositionMigrated {
        account: Address,
        asset: AssetId,
        legacy_epoch: Epoch,
        index: AccrualIndex,
        quantity: u128,
        value: u128,
        epoch: Epoch,
    },

    // ============ Balance Events ============

    /// Stalk and roots of an account changed
    StalkChanged {
        account: Address,
        stalk_delta: i128,
        roots_delta: i128,
        stalk: u128,
        roots: u128,
        epoch: Epoch,
    },

    /// Earned reward was planted as a base-asset position
    Planted {
        account: Address,
        index: AccrualIndex,
        quantity: u128,
        stalk: u128,
        epoch: Epoch,
    },

    /// Positions of one asset were converted into another
    Converted {
        account: Address,
        from_asset: AssetId,
        to_asset: AssetId,
        removed_quantity: u128,
        removed_value: u128,
        new_index: AccrualIndex,
        new_quantity: u128,
        new_value: u128,
        carried_reward: u128,
        forfeited_reward: u128,
        epoch: Epoch,
    },

    // ============ Flood Events ============

    /// A flood began; roots are locked at this total
    FloodStarted { roots: u128, epoch: Epoch },

    /// Flood asset was distributed over locked roots
    FloodPaid {
        flood_start: Epoch,
        amount: u128,
        payout_per_root: u128,
        epoch: Epoch,
    },

    /// The flood ended
    FloodEnded { flood_start: Epoch, epoch: Epoch },

    /// An account claimed its flood payout
    FloodPayoutClaimed {
        account: Address,
        asset: AssetId,
        amount: u128,
        epoch: Epoch,
    },

    // ============ Protocol Events ============

    /// The epoch advanced
    EpochAdvanced { previous: Epoch, epoch: Epoch },

    /// Base-asset reward entered the earned pool
    EarnedRewardReceived {
        amount: u128,
        pool: u128,
        epoch: Epoch,
    },

    /// An asset was whitelisted
    AssetWhitelisted {
        asset: AssetId,
        stalk_per_value: u128,
        accrual_rate: i128,
        epoch: Epoch,
    },

    /// An asset stopped accepting deposits and accruing
    AssetDewhitelisted { asset: AssetId, epoch: Epoch },

    /// The accrual rate of an asset changed
    AccrualRateChanged {
        asset: AssetId,
        old_rate: i128,
        new_rate: i128,
        epoch: Epoch,
    },
}

impl SiloEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::PositionAdded { .. } => EventType::PositionAdded,
            Self::PositionRemoved { .. } => EventType::PositionRemoved,
            Self::PositionTransferred { .. } => EventType::PositionTransferred,
            Self::LegacyPositionImported { .. } => EventType::LegacyPositionImported,
            Self::LegacyPositionMigrated { .. } => EventType::LegacyPositionMigrated,
            Self::StalkChanged { .. } => EventType::StalkChanged,
            Self::Planted { .. } => EventType::Planted,
            Self::Converted { .. } => EventType::Converted,
            Self::FloodStarted { .. } => EventType::FloodStarted,
            Self::FloodPaid { .. } => EventType::FloodPaid,
            Self::FloodEnded { .. } => EventType::FloodEnded,
            Self::FloodPayoutClaimed { .. } => EventType::FloodPayoutClaimed,
            Self::EpochAdvanced { .. } => EventType::EpochAdvanced,
            Self::EarnedRewardReceived { .. } => EventType::EarnedRewardReceived,
            Self::AssetWhitelisted { .. } => EventType::AssetWhitelisted,
            Self::AssetDewhitelisted { .. } => EventType::AssetDewhitelisted,
            Self::AccrualRateChanged { .. } => EventType::AccrualRateChanged,
        }
    }

    /// Get the epoch the event occurred in
    pub fn epoch(&self) -> Epoch {
        match self {
            Self::PositionAdded { epoch, .. }
            | Self::PositionRemoved { epoch, .. }
            | Self::PositionTransferred { epoch, .. }
            | Self::LegacyPositionImported { epoch, .. }
            | Self::LegacyPositionMigrated { epoch, .. }
            | Self::StalkChanged { epoch, .. }
            | Self::Planted { epoch, .. }
            | Self::Converted { epoch, .. }
            | Self::FloodStarted { epoch, .. }
            | Self::FloodPaid { epoch, .. }
            | Self::FloodEnded { epoch, .. }
            | Self::FloodPayoutClaimed { epoch, .. }
            | Self::EpochAdvanced { epoch, .. }
            | Self::EarnedRewardReceived { epoch, .. }
            | Self::AssetWhitelisted { epoch, .. }
            | Self::AssetDewhitelisted { epoch, .. }
            | Self::AccrualRateChanged { epoch, .. } => *epoch,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting events during execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<SiloEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: SiloEvent) {
        self.events.push(event);
    }

    /// Move every event of `other` to the end of this log
    pub fn append(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Get all events
    pub fn events(&self) -> &[SiloEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<SiloEvent> {
        self.events
    }

    /// Take all events, leaving the log empty
    pub fn drain(&mut self) -> Vec<SiloEvent> {
        core::mem::take(&mut self.events)
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&SiloEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = SiloEvent::PositionAdded {
            position_id: [9u8; 32],
            account: [1u8; 32],
            asset: [2u8; 32],
            index: 40,
            quantity: 1_000,
            value: 1_000,
            epoch: 12,
        };

        assert_eq!(event.event_type(), EventType::PositionAdded);
        assert_eq!(event.epoch(), 12);
    }

    #[test]
    fn test_event_bytes_keep_signed_fields() {
        let event = SiloEvent::StalkChanged {
            account: [1u8; 32],
            stalk_delta: -250,
            roots_delta: -2_500,
            stalk: 750,
            roots: 7_500,
            epoch: 3,
        };

        let restored = SiloEvent::from_bytes(&event.to_bytes()).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();
        log.emit(SiloEvent::EpochAdvanced {
            previous: 1,
            epoch: 2,
        });

        let mut other = EventLog::new();
        other.emit(SiloEvent::FloodStarted { roots: 10, epoch: 2 });
        other.emit(SiloEvent::FloodEnded {
            flood_start: 2,
            epoch: 3,
        });
        log.append(other);

        assert_eq!(log.len(), 3);
        assert!(log.has_events());
        assert_eq!(log.filter_by_type(EventType::FloodEnded).len(), 1);

        let drained = log.drain();
        assert_eq!(drained.len(), 3);
        assert!(log.is_empty());
    }
}
