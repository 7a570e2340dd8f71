//! Proximity filter: decides whether an inbound transmission is visible on
//! this device at this position.
//!
//! The decision sequence is deliberately asymmetric: every branch that lacks
//! the information for a confident deny admits the message, because hiding a
//! transmission that should have been shown is worse than showing one that
//! is technically out of range. The only deny paths are a sender kind that
//! is structurally incapable of transmitting, and a computed distance that
//! exceeds the matrix range.
//!
//! Missing data (no device tag, no coordinate, no local fix) is a normal
//! condition here, not an error: nothing in this module logs or reports it.

use breaker_types::models::{Coordinate, DeviceKind};

use crate::device;
use crate::geo;

/// Whether to admit `message` into local channel history.
///
/// `msg_device`/`msg_location` come off the wire; `my_device` is the local
/// user's current device kind and `my_location` the local fix, both polled
/// at evaluation time.
pub fn should_admit(
    msg_device: Option<DeviceKind>,
    msg_location: Option<Coordinate>,
    my_device: Option<DeviceKind>,
    my_location: Option<Coordinate>,
) -> bool {
    // Own device unknown: cannot evaluate, assume worth showing.
    let mine = match my_device {
        Some(kind) => kind,
        None => return true,
    };

    // Receive-only listens at any distance.
    if mine == DeviceKind::Receiver {
        return true;
    }

    // Legacy rows carry no device tag.
    let sender = match msg_device {
        Some(kind) => kind,
        None => return true,
    };

    // The one hard deny not driven by missing data: a receive-only kind can
    // never legitimately originate a transmission.
    if sender == DeviceKind::Receiver {
        return false;
    }

    // Coordinate unavailable at send time.
    let sender_pos = match msg_location {
        Some(pos) => pos,
        None => return true,
    };

    // No local fix: cannot evaluate distance.
    let my_pos = match my_location {
        Some(pos) => pos,
        None => return true,
    };

    let d = geo::distance_km(my_pos, sender_pos);
    match device::max_range_km(sender, mine) {
        Some(reach) => reach.admits(d),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DeviceKind::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon)
    }

    /// A point `km` kilometers due north of `origin`.
    fn north_of(origin: Coordinate, km: f64) -> Coordinate {
        coord(origin.lat + km / 111.195, origin.lon)
    }

    const ORIGIN: Coordinate = Coordinate { lat: 52.52, lon: 13.405 };

    // Branch 1: own device unknown.
    #[test]
    fn admits_when_own_device_unknown() {
        let far = north_of(ORIGIN, 5000.0);
        assert!(should_admit(Some(Handheld), Some(far), None, Some(ORIGIN)));
    }

    // Branch 2: own device is the receive-only kind.
    #[test]
    fn receiver_admits_everything() {
        let far = north_of(ORIGIN, 500.0);
        for sender in [Handheld, BaseStation, Relay] {
            assert!(should_admit(
                Some(sender),
                Some(far),
                Some(Receiver),
                Some(ORIGIN)
            ));
        }
    }

    // Branch 3: message without a device tag (legacy data).
    #[test]
    fn admits_legacy_message_without_device_tag() {
        let far = north_of(ORIGIN, 5000.0);
        assert!(should_admit(None, Some(far), Some(Handheld), Some(ORIGIN)));
    }

    // Branch 4: the only hard deny — sender kind cannot transmit.
    #[test]
    fn denies_message_tagged_with_receive_only_sender() {
        for receiver in [Handheld, BaseStation, Relay] {
            // Regardless of distance, even with no coordinate at all.
            assert!(!should_admit(
                Some(Receiver),
                Some(ORIGIN),
                Some(receiver),
                Some(ORIGIN)
            ));
            assert!(!should_admit(Some(Receiver), None, Some(receiver), None));
        }
    }

    // Branch 5: message without a sender coordinate.
    #[test]
    fn admits_message_without_coordinate() {
        assert!(should_admit(Some(Handheld), None, Some(Handheld), Some(ORIGIN)));
    }

    // Branch 6: local location unavailable.
    #[test]
    fn admits_when_local_location_unavailable() {
        let far = north_of(ORIGIN, 5000.0);
        assert!(should_admit(Some(Handheld), Some(far), Some(Handheld), None));
    }

    // Branch 7: distance against the matrix range.
    #[test]
    fn handheld_pair_inside_range() {
        let sender_pos = north_of(ORIGIN, 2.9);
        assert!(should_admit(
            Some(Handheld),
            Some(sender_pos),
            Some(Handheld),
            Some(ORIGIN)
        ));
    }

    #[test]
    fn handheld_pair_beyond_range() {
        let sender_pos = north_of(ORIGIN, 3.1);
        assert!(!should_admit(
            Some(Handheld),
            Some(sender_pos),
            Some(Handheld),
            Some(ORIGIN)
        ));
    }

    #[test]
    fn stronger_station_on_either_end_extends_reach() {
        // 20 km: beyond handheld-handheld, inside anything involving a base
        // station.
        let sender_pos = north_of(ORIGIN, 20.0);
        assert!(!should_admit(
            Some(Handheld),
            Some(sender_pos),
            Some(Handheld),
            Some(ORIGIN)
        ));
        assert!(should_admit(
            Some(BaseStation),
            Some(sender_pos),
            Some(Handheld),
            Some(ORIGIN)
        ));
        assert!(should_admit(
            Some(Handheld),
            Some(sender_pos),
            Some(BaseStation),
            Some(ORIGIN)
        ));
    }

    #[test]
    fn decision_matches_matrix_for_all_send_capable_pairs() {
        let capable = [Handheld, BaseStation, Relay];
        for s in capable {
            for r in capable {
                for d in [0.0, 2.9, 3.1, 24.9, 25.1, 199.9, 200.1, 1000.0] {
                    let sender_pos = north_of(ORIGIN, d);
                    let admitted =
                        should_admit(Some(s), Some(sender_pos), Some(r), Some(ORIGIN));
                    let reach = crate::device::max_range_km(s, r).unwrap();
                    // Re-derive the distance the filter computed so the
                    // comparison carries no placement error.
                    let actual_d = crate::geo::distance_km(ORIGIN, sender_pos);
                    assert_eq!(admitted, reach.admits(actual_d), "{s:?}->{r:?} at {d}km");
                }
            }
        }
    }

    #[test]
    fn same_inputs_reproduce_the_same_decision() {
        // Round-trip determinism: re-evaluating with identical values never
        // flips the outcome.
        let sender_pos = north_of(ORIGIN, 2.9997);
        let first = should_admit(Some(Handheld), Some(sender_pos), Some(Handheld), Some(ORIGIN));
        for _ in 0..100 {
            assert_eq!(
                first,
                should_admit(Some(Handheld), Some(sender_pos), Some(Handheld), Some(ORIGIN))
            );
        }
    }
}
