// Resource leases - short-lived exclusive tokens over an opaque value
//
// A lease is busy while `now < expires_at` and available otherwise, whether
// or not it is still stored. Nothing sweeps the table; stale entries are
// reclaimed on their next access.

use crate::{
    error::GoneReason,
    time::{to_chrono, Clock, SystemClock, Timestamp},
    Error, Result,
};
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lease {
    pub id: Uuid,
    pub value: i64,
    pub expires_at: Timestamp,
}

impl Lease {
    pub fn is_busy(&self, now: Timestamp) -> bool {
        now < self.expires_at
    }

    pub fn time_remaining(&self, now: Timestamp) -> chrono::Duration {
        if self.is_busy(now) {
            self.expires_at - now
        } else {
            chrono::Duration::zero()
        }
    }
}

/// Returned by operations that hand out (or hand back) a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaseGrant {
    pub id: Uuid,
    pub expires_at: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaseValue {
    pub id: Uuid,
    pub value: i64,
}

pub fn parse_key(key: &str) -> Result<Uuid> {
    Uuid::parse_str(key.trim()).map_err(|_| Error::InvalidKey(key.to_string()))
}

fn random_value() -> i64 {
    rand::rng().random_range(1..=1000)
}

#[derive(Debug)]
pub struct LeaseManager {
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    leases: DashMap<Uuid, Lease>,
}

impl LeaseManager {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: to_chrono(ttl),
            clock,
            leases: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Mints a new lease holding a random value.
    pub fn create(&self) -> LeaseGrant {
        let id = Uuid::new_v4();
        let expires_at = self.clock.now() + self.ttl;
        self.leases.insert(
            id,
            Lease {
                id,
                value: random_value(),
                expires_at,
            },
        );
        debug!(lease_id = %id, %expires_at, "lease created");
        LeaseGrant { id, expires_at }
    }

    /// Takes over an available lease, or mints a new one when `key` is unknown.
    ///
    /// Asking for a lease that is still busy fails with `Conflict` and also
    /// cuts the holder's remaining time to zero.
    pub fn acquire_or_renew(&self, key: &str, value: Option<i64>) -> Result<LeaseGrant> {
        let id = parse_key(key)?;
        let now = self.clock.now();

        // The shard guard must be gone before `create` inserts.
        let outcome = match self.leases.get_mut(&id) {
            Some(mut lease) => {
                if lease.is_busy(now) {
                    lease.expires_at = now;
                    debug!(lease_id = %id, "lease busy, holder's time cut short");
                    Some(Err(Error::Conflict(id)))
                } else {
                    if let Some(value) = value {
                        lease.value = value;
                    }
                    lease.expires_at = now + self.ttl;
                    debug!(lease_id = %id, expires_at = %lease.expires_at, "lease renewed");
                    Some(Ok(LeaseGrant {
                        id,
                        expires_at: lease.expires_at,
                    }))
                }
            }
            None => None,
        };

        match outcome {
            Some(result) => result,
            None => Ok(self.create()),
        }
    }

    pub fn get(&self, key: &str) -> Result<i64> {
        let id = parse_key(key).map_err(|_| Error::Unauthorized)?;
        let now = self.clock.now();
        match self.leases.get(&id) {
            Some(lease) if lease.is_busy(now) => Ok(lease.value),
            _ => Err(Error::Unauthorized),
        }
    }

    /// Stores a new value. The lease becomes available straight away.
    pub fn update(&self, key: &str, value: i64) -> Result<LeaseValue> {
        let id = parse_key(key)?;
        let now = self.clock.now();
        let mut lease = self
            .leases
            .get_mut(&id)
            .filter(|lease| lease.is_busy(now))
            .ok_or(Error::Unauthorized)?;
        lease.value = value;
        lease.expires_at = now;
        Ok(LeaseValue { id, value })
    }

    /// Removes the lease. A lease that had already expired is removed too,
    /// but the call still reports `Gone`.
    pub fn release(&self, key: &str) -> Result<()> {
        let id = parse_key(key)?;
        let now = self.clock.now();
        let (_, lease) = self.leases.remove(&id).ok_or(Error::Gone {
            id,
            reason: GoneReason::Missing,
        })?;
        if lease.is_busy(now) {
            debug!(lease_id = %id, "lease released");
            Ok(())
        } else {
            Err(Error::Gone {
                id,
                reason: GoneReason::Expired,
            })
        }
    }

    pub fn lease(&self, id: &Uuid) -> Option<Lease> {
        self.leases.get(id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}
