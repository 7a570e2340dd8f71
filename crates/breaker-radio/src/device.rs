//! Device registry: per-kind constants, unlock requirements, and the
//! sender→receiver compatibility matrix.
//!
//! The matrix is written out as an explicit table rather than derived from
//! the per-kind ranges. The "larger of the two ranges" rule holds for every
//! send-capable pair, but both receive-only boundaries break it: a
//! `Receiver` on the listening end hears everything at any distance, and a
//! `Receiver` on the sending end is not a valid pair at all.

use breaker_types::models::DeviceKind;

/// Effective maximum range for a sender→receiver pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reach {
    Unlimited,
    Km(f64),
}

impl Reach {
    /// Whether a transmission at distance `d` km lands inside this reach.
    pub fn admits(&self, d: f64) -> bool {
        match self {
            Reach::Unlimited => true,
            Reach::Km(r) => d <= *r,
        }
    }
}

/// One named resource cost on a device unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCost {
    pub resource: &'static str,
    pub amount: i64,
}

/// What it takes to unlock a device kind.
#[derive(Debug, Clone, Copy)]
pub struct UnlockRequirements {
    /// Device kind that must already be unlocked.
    pub prerequisite: Option<DeviceKind>,
    /// Minimum owned-territory count.
    pub min_territories: i64,
    pub costs: &'static [ResourceCost],
}

pub fn display_name(kind: DeviceKind) -> &'static str {
    match kind {
        DeviceKind::Receiver => "Broadcast Receiver",
        DeviceKind::Handheld => "Handheld Radio",
        DeviceKind::BaseStation => "Base Station",
        DeviceKind::Relay => "Relay Tower",
    }
}

/// Nominal transmit/receive range in km. `None` means unlimited; only the
/// receive-only kind, which listens at any distance.
pub fn range_km(kind: DeviceKind) -> Option<f64> {
    match kind {
        DeviceKind::Receiver => None,
        DeviceKind::Handheld => Some(3.0),
        DeviceKind::BaseStation => Some(25.0),
        DeviceKind::Relay => Some(200.0),
    }
}

pub fn can_send(kind: DeviceKind) -> bool {
    !matches!(kind, DeviceKind::Receiver)
}

/// Default kind for new users: unlocked and current from the first session.
pub const DEFAULT_KIND: DeviceKind = DeviceKind::Receiver;

/// Unlock requirements per kind. `None` for the default kind, which every
/// user starts with.
pub fn requirements(kind: DeviceKind) -> Option<UnlockRequirements> {
    match kind {
        DeviceKind::Receiver => None,
        DeviceKind::Handheld => Some(UnlockRequirements {
            prerequisite: None,
            min_territories: 0,
            costs: &[ResourceCost { resource: "scrap", amount: 50 }],
        }),
        DeviceKind::BaseStation => Some(UnlockRequirements {
            prerequisite: Some(DeviceKind::Handheld),
            min_territories: 1,
            costs: &[
                ResourceCost { resource: "scrap", amount: 200 },
                ResourceCost { resource: "components", amount: 40 },
            ],
        }),
        DeviceKind::Relay => Some(UnlockRequirements {
            prerequisite: Some(DeviceKind::BaseStation),
            min_territories: 2,
            costs: &[
                ResourceCost { resource: "scrap", amount: 500 },
                ResourceCost { resource: "components", amount: 120 },
                ResourceCost { resource: "power_cell", amount: 10 },
            ],
        }),
    }
}

/// Compatibility matrix: effective maximum range for a sender→receiver pair,
/// or `None` when the pair cannot exist (`Receiver` never originates).
///
/// Explicit table. Send-capable pairs take the larger of the two nominal
/// ranges: coverage is dominated by the better-equipped party.
pub fn max_range_km(sender: DeviceKind, receiver: DeviceKind) -> Option<Reach> {
    use DeviceKind::*;
    match (sender, receiver) {
        // Receive-only on the listening end: hears everything.
        (_, Receiver) => Some(Reach::Unlimited),
        // Receive-only on the sending end: not a valid pair.
        (Receiver, _) => None,

        (Handheld, Handheld) => Some(Reach::Km(3.0)),
        (Handheld, BaseStation) => Some(Reach::Km(25.0)),
        (Handheld, Relay) => Some(Reach::Km(200.0)),

        (BaseStation, Handheld) => Some(Reach::Km(25.0)),
        (BaseStation, BaseStation) => Some(Reach::Km(25.0)),
        (BaseStation, Relay) => Some(Reach::Km(200.0)),

        (Relay, Handheld) => Some(Reach::Km(200.0)),
        (Relay, BaseStation) => Some(Reach::Km(200.0)),
        (Relay, Relay) => Some(Reach::Km(200.0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeviceKind::*;

    #[test]
    fn receiver_cannot_send() {
        assert!(!can_send(Receiver));
        assert!(can_send(Handheld));
        assert!(can_send(BaseStation));
        assert!(can_send(Relay));
    }

    #[test]
    fn receiver_column_is_unlimited_for_every_sender() {
        for s in DeviceKind::ALL {
            assert_eq!(max_range_km(s, Receiver), Some(Reach::Unlimited));
        }
    }

    #[test]
    fn receiver_row_is_incompatible_except_toward_receivers() {
        assert_eq!(max_range_km(Receiver, Handheld), None);
        assert_eq!(max_range_km(Receiver, BaseStation), None);
        assert_eq!(max_range_km(Receiver, Relay), None);
        // Receiver-to-receiver still falls on the unlimited column.
        assert_eq!(max_range_km(Receiver, Receiver), Some(Reach::Unlimited));
    }

    #[test]
    fn send_capable_pairs_take_the_larger_range() {
        let capable = [Handheld, BaseStation, Relay];
        for s in capable {
            for r in capable {
                let expected = range_km(s).unwrap().max(range_km(r).unwrap());
                match max_range_km(s, r) {
                    Some(Reach::Km(got)) => assert_eq!(got, expected, "{s:?}->{r:?}"),
                    other => panic!("{s:?}->{r:?} gave {other:?}"),
                }
            }
        }
    }

    #[test]
    fn reach_admits_at_the_boundary() {
        let r = Reach::Km(3.0);
        assert!(r.admits(2.9));
        assert!(r.admits(3.0));
        assert!(!r.admits(3.1));
        assert!(Reach::Unlimited.admits(f64::MAX));
    }

    #[test]
    fn upgrade_chain_is_ordered() {
        assert!(requirements(Receiver).is_none());
        assert_eq!(requirements(Handheld).unwrap().prerequisite, None);
        assert_eq!(
            requirements(BaseStation).unwrap().prerequisite,
            Some(Handheld)
        );
        assert_eq!(requirements(Relay).unwrap().prerequisite, Some(BaseStation));
        assert_eq!(requirements(Relay).unwrap().min_territories, 2);
    }
}
