//! Device unlock/progression state machine.
//!
//! Per user, each device kind is locked or unlocked, and exactly one
//! unlocked kind is current. Unlock requirements come from the device
//! registry; resource quantities and territory counts come from the
//! inventory and territory systems behind the provider traits below.
//!
//! All operations for one user serialize on a per-user lock, so concurrent
//! unlock and switch calls cannot race the current-device invariant or
//! double-spend resources.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use breaker_radio::device;
use breaker_types::models::{DeviceKind, DeviceState};

/// Inventory contract. `refund` is the compensation path when an unlock
/// fails after deduction (§ concurrency notes in DESIGN.md).
pub trait ResourceLedger: Send + Sync {
    fn quantity_of(&self, user_id: Uuid, resource: &str) -> anyhow::Result<i64>;
    fn deduct(&self, user_id: Uuid, resource: &str, amount: i64) -> anyhow::Result<()>;
    fn refund(&self, user_id: Uuid, resource: &str, amount: i64) -> anyhow::Result<()>;
}

/// Territory system contract.
pub trait TerritoryProvider: Send + Sync {
    fn owned_territory_count(&self, user_id: Uuid) -> anyhow::Result<i64>;
}

/// Persistence contract for the per-user device rows.
pub trait DeviceStateStore: Send + Sync {
    /// All rows for the user, lazily seeded (default kind unlocked+current).
    fn device_states(&self, user_id: Uuid) -> anyhow::Result<Vec<DeviceState>>;
    fn set_unlocked(&self, user_id: Uuid, kind: DeviceKind) -> anyhow::Result<()>;
    /// Atomic swap; returns false when `kind` is not unlocked.
    fn switch_current(&self, user_id: Uuid, kind: DeviceKind) -> anyhow::Result<bool>;
}

/// One resource the user is short of, with enough detail for the UI to show
/// an actionable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceShortfall {
    pub resource: String,
    pub have: i64,
    pub need: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked,
    /// The kind was already unlocked: idempotent no-op, not an error.
    AlreadyUnlocked,
}

#[derive(Debug, Error)]
pub enum UnlockError {
    #[error("requires {0:?} to be unlocked first")]
    MissingPrerequisite(DeviceKind),
    #[error("requires {need} owned territories, have {have}")]
    InsufficientTerritories { have: i64, need: i64 },
    /// Every shortfall is collected before failing, not just the first.
    #[error("insufficient resources for unlock")]
    InsufficientResources(Vec<ResourceShortfall>),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("{0:?} is not unlocked")]
    NotUnlocked(DeviceKind),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct ProgressionService {
    devices: Arc<dyn DeviceStateStore>,
    ledger: Arc<dyn ResourceLedger>,
    territories: Arc<dyn TerritoryProvider>,
    user_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ProgressionService {
    pub fn new(
        devices: Arc<dyn DeviceStateStore>,
        ledger: Arc<dyn ResourceLedger>,
        territories: Arc<dyn TerritoryProvider>,
    ) -> Self {
        Self {
            devices,
            ledger,
            territories,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.user_locks.lock().expect("user lock map poisoned");
        locks.entry(user_id).or_default().clone()
    }

    pub fn device_states(&self, user_id: Uuid) -> anyhow::Result<Vec<DeviceState>> {
        self.devices.device_states(user_id)
    }

    pub fn current_device(&self, user_id: Uuid) -> anyhow::Result<Option<DeviceKind>> {
        Ok(self
            .devices
            .device_states(user_id)?
            .into_iter()
            .find(|s| s.is_current)
            .map(|s| s.kind))
    }

    /// Validation chain per the registry requirements, then
    /// deduct-all-costs + flip-unlocked. If the flag write fails after
    /// deduction, every applied cost is refunded so the caller can retry
    /// from a consistent state. Does not switch the current device.
    pub fn attempt_unlock(
        &self,
        user_id: Uuid,
        kind: DeviceKind,
    ) -> Result<UnlockOutcome, UnlockError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().expect("user lock poisoned");

        let states = self.devices.device_states(user_id)?;
        let unlocked = |k: DeviceKind| states.iter().any(|s| s.kind == k && s.is_unlocked);

        if unlocked(kind) {
            return Ok(UnlockOutcome::AlreadyUnlocked);
        }

        let Some(req) = device::requirements(kind) else {
            // Default kind carries no requirements; honor a stray unlock
            // call by just setting the flag.
            self.devices.set_unlocked(user_id, kind)?;
            return Ok(UnlockOutcome::Unlocked);
        };

        if let Some(prereq) = req.prerequisite {
            if !unlocked(prereq) {
                return Err(UnlockError::MissingPrerequisite(prereq));
            }
        }

        let have = self.territories.owned_territory_count(user_id)?;
        if have < req.min_territories {
            return Err(UnlockError::InsufficientTerritories {
                have,
                need: req.min_territories,
            });
        }

        // Evaluate every cost before failing so the caller can report all
        // shortfalls at once.
        let mut shortfalls = Vec::new();
        for cost in req.costs {
            let held = self.ledger.quantity_of(user_id, cost.resource)?;
            if held < cost.amount {
                shortfalls.push(ResourceShortfall {
                    resource: cost.resource.to_string(),
                    have: held,
                    need: cost.amount,
                });
            }
        }
        if !shortfalls.is_empty() {
            return Err(UnlockError::InsufficientResources(shortfalls));
        }

        let mut applied: Vec<&device::ResourceCost> = Vec::new();
        for cost in req.costs {
            if let Err(e) = self.ledger.deduct(user_id, cost.resource, cost.amount) {
                self.refund_applied(user_id, &applied);
                return Err(UnlockError::Store(e));
            }
            applied.push(cost);
        }

        if let Err(e) = self.devices.set_unlocked(user_id, kind) {
            self.refund_applied(user_id, &applied);
            return Err(UnlockError::Store(e));
        }

        info!(user = %user_id, kind = kind.as_str(), "device unlocked");
        Ok(UnlockOutcome::Unlocked)
    }

    fn refund_applied(&self, user_id: Uuid, applied: &[&device::ResourceCost]) {
        for cost in applied {
            if let Err(e) = self.ledger.refund(user_id, cost.resource, cost.amount) {
                // Nothing further to do here; the operator has to reconcile.
                warn!(
                    user = %user_id,
                    resource = cost.resource,
                    amount = cost.amount,
                    "refund failed after aborted unlock: {e}"
                );
            }
        }
    }

    /// Make `kind` the current device. Requires it to be unlocked; the swap
    /// itself is atomic in the store, and the per-user lock makes concurrent
    /// switches last-writer-wins rather than a race.
    pub fn switch_current(&self, user_id: Uuid, kind: DeviceKind) -> Result<(), SwitchError> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().expect("user lock poisoned");

        if self.devices.switch_current(user_id, kind)? {
            info!(user = %user_id, kind = kind.as_str(), "current device switched");
            Ok(())
        } else {
            Err(SwitchError::NotUnlocked(kind))
        }
    }
}
