//! Provider-trait implementations backed by the adapter tables.
//!
//! In a full deployment the inventory and territory systems own this data;
//! a single-node install points the progression service at these instead.

use anyhow::bail;
use uuid::Uuid;

use breaker_progression::{DeviceStateStore, ResourceLedger, TerritoryProvider};
use breaker_types::models::{DeviceKind, DeviceState};

use crate::Database;

impl ResourceLedger for Database {
    fn quantity_of(&self, user_id: Uuid, resource: &str) -> anyhow::Result<i64> {
        self.resource_quantity(&user_id.to_string(), resource)
    }

    fn deduct(&self, user_id: Uuid, resource: &str, amount: i64) -> anyhow::Result<()> {
        if !self.resource_deduct(&user_id.to_string(), resource, amount)? {
            bail!("insufficient {resource} for user {user_id}");
        }
        Ok(())
    }

    fn refund(&self, user_id: Uuid, resource: &str, amount: i64) -> anyhow::Result<()> {
        self.resource_add(&user_id.to_string(), resource, amount)
    }
}

impl TerritoryProvider for Database {
    fn owned_territory_count(&self, user_id: Uuid) -> anyhow::Result<i64> {
        self.territory_count(&user_id.to_string())
    }
}

impl DeviceStateStore for Database {
    fn device_states(&self, user_id: Uuid) -> anyhow::Result<Vec<DeviceState>> {
        self.device_states(&user_id.to_string())?
            .into_iter()
            .map(|row| row.into_state())
            .collect()
    }

    fn set_unlocked(&self, user_id: Uuid, kind: DeviceKind) -> anyhow::Result<()> {
        self.set_device_unlocked(&user_id.to_string(), kind.as_str())
    }

    fn switch_current(&self, user_id: Uuid, kind: DeviceKind) -> anyhow::Result<bool> {
        self.switch_current_device(&user_id.to_string(), kind.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breaker_progression::{ProgressionService, UnlockOutcome};
    use std::sync::Arc;

    /// End-to-end over SQLite: the same flow the API drives in production.
    #[test]
    fn unlock_chain_over_sqlite() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = Uuid::new_v4();
        db.create_user(&user.to_string(), "alice", "hash").unwrap();
        db.resource_add(&user.to_string(), "scrap", 250).unwrap();
        db.resource_add(&user.to_string(), "components", 40).unwrap();
        db.set_territory_count(&user.to_string(), 1).unwrap();

        let svc = ProgressionService::new(db.clone(), db.clone(), db.clone());

        assert_eq!(
            svc.attempt_unlock(user, DeviceKind::Handheld).unwrap(),
            UnlockOutcome::Unlocked
        );
        assert_eq!(
            svc.attempt_unlock(user, DeviceKind::BaseStation).unwrap(),
            UnlockOutcome::Unlocked
        );
        assert_eq!(db.resource_quantity(&user.to_string(), "scrap").unwrap(), 0);

        svc.switch_current(user, DeviceKind::BaseStation).unwrap();
        assert_eq!(
            db.current_device(&user.to_string()).unwrap().as_deref(),
            Some("base_station")
        );
    }
}
