//! Local-state contracts polled at filter-evaluation time.

use breaker_types::models::{Coordinate, DeviceKind};

/// Platform location service. May legitimately report "unavailable"; the
/// proximity filter treats that as a conservative-admit condition, not an
/// error.
pub trait LocationProvider: Send + Sync {
    fn current_location(&self) -> Option<Coordinate>;
}

/// Where the local user's current device kind comes from (the progression
/// state, cached client-side). `None` while that state has not loaded yet.
pub trait DeviceProvider: Send + Sync {
    fn current_device(&self) -> Option<DeviceKind>;
}
