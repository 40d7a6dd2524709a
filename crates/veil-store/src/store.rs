//! Expiring, single-consumption transfer store
//!
//! Each id maps to a slot:
//!   - `Live`: redeemable record (ciphertext + metadata)
//!   - `Consumed`: tombstone left by a successful redemption
//!   - `Expired`: tombstone left when a live record passed its TTL
//!
//! Tombstones hold no ciphertext. They keep answering "already consumed" /
//! "expired" instead of "not found" until `ttl + tombstone_grace` has
//! passed, after which the sweep drops them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};
use veil_core::config::StoreConfig;
use veil_core::{Clock, SystemClock, VeilError, VeilResult};
use zeroize::Zeroizing;

use crate::record::StoredTransfer;

/// Opens a staged record, typically by decrypting it.
pub type OpenFn<'a> = dyn FnMut(&StoredTransfer) -> VeilResult<Zeroizing<Vec<u8>>> + 'a;

/// Staged-mode capability: put a transfer aside, redeem it once.
pub trait Stager: Send + Sync {
    /// TTL applied to transfers whose sender sets none
    fn default_ttl(&self) -> Duration;

    fn stage(&self, id: &str, record: StoredTransfer, ttl: Duration) -> VeilResult<()>;

    /// Redeem `id`. Fails with `NotFound`, `AlreadyConsumed` or `Expired`.
    fn fetch(&self, id: &str) -> VeilResult<StoredTransfer>;

    /// Redeem `id` through `open`. The record is consumed only when `open`
    /// succeeds; on error it stays staged for the next attempt.
    fn redeem(&self, id: &str, open: &mut OpenFn<'_>) -> VeilResult<Zeroizing<Vec<u8>>>;
}

enum Slot {
    Live { record: StoredTransfer, ttl: Duration },
    Consumed { created_at: u64, ttl: Duration },
    Expired { created_at: u64, ttl: Duration },
}

impl Slot {
    fn created_at(&self) -> u64 {
        match self {
            Slot::Live { record, .. } => record.timestamp,
            Slot::Consumed { created_at, .. } | Slot::Expired { created_at, .. } => *created_at,
        }
    }

    fn ttl(&self) -> Duration {
        match self {
            Slot::Live { ttl, .. } | Slot::Consumed { ttl, .. } | Slot::Expired { ttl, .. } => *ttl,
        }
    }

    fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at())
    }

    /// `now - created_at > ttl`
    fn is_past_ttl(&self, now: u64) -> bool {
        self.age(now) > millis(self.ttl())
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

pub struct TransientStore {
    slots: Mutex<HashMap<String, Slot>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
    tombstone_grace: Duration,
}

impl TransientStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &StoreConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            clock,
            default_ttl: config.ttl(),
            tombstone_grace: config.tombstone_grace(),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // A panic mid-operation leaves the map itself consistent
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `record` under `id`, replacing whatever was there. The record
    /// is stamped with the store's clock; expiry is measured from that stamp.
    pub fn stage(&self, id: &str, mut record: StoredTransfer, ttl: Duration) {
        let now = self.clock.now_millis();
        record.timestamp = now;
        let mut slots = self.lock();
        self.sweep(&mut slots, now);

        let size = record.encrypted.len();
        let slot = if record.consumed {
            Slot::Consumed {
                created_at: now,
                ttl,
            }
        } else {
            Slot::Live { record, ttl }
        };
        if slots.insert(id.to_string(), slot).is_some() {
            debug!(transfer_id = %id, "replaced stale staged transfer");
        }
        info!(transfer_id = %id, bytes = size, ttl_secs = ttl.as_secs(), "transfer staged");
    }

    /// Check existence, expiry, and consumption, and on success hand the
    /// record over, all under one lock. Of any number of concurrent callers
    /// for the same id, exactly one gets the record.
    pub fn fetch_and_consume(&self, id: &str) -> VeilResult<StoredTransfer> {
        self.consume_with(id, |_| Ok(())).map(|((), record)| record)
    }

    /// Like [`fetch_and_consume`](Self::fetch_and_consume), but `open` runs
    /// on the live record under the same lock and the slot is only
    /// tombstoned if it returns `Ok`. A failed open leaves the transfer
    /// redeemable.
    pub fn fetch_and_consume_with<T>(
        &self,
        id: &str,
        open: impl FnOnce(&StoredTransfer) -> VeilResult<T>,
    ) -> VeilResult<T> {
        self.consume_with(id, open).map(|(value, _)| value)
    }

    fn consume_with<T>(
        &self,
        id: &str,
        open: impl FnOnce(&StoredTransfer) -> VeilResult<T>,
    ) -> VeilResult<(T, StoredTransfer)> {
        let now = self.clock.now_millis();
        let mut slots = self.lock();

        let Some(slot) = slots.get_mut(id) else {
            warn!(transfer_id = %id, "redemption of unknown transfer");
            return Err(VeilError::NotFound);
        };

        if slot.is_past_ttl(now) {
            if matches!(slot, Slot::Live { .. }) {
                *slot = Slot::Expired {
                    created_at: slot.created_at(),
                    ttl: slot.ttl(),
                };
            }
            warn!(transfer_id = %id, age_ms = slot.age(now), "redemption of expired transfer");
            return Err(VeilError::Expired);
        }

        let tombstone = Slot::Consumed {
            created_at: slot.created_at(),
            ttl: slot.ttl(),
        };
        match std::mem::replace(slot, tombstone) {
            Slot::Live { mut record, ttl } => match open(&record) {
                Ok(value) => {
                    record.consumed = true;
                    info!(transfer_id = %id, "transfer redeemed");
                    Ok((value, record))
                }
                Err(e) => {
                    *slot = Slot::Live { record, ttl };
                    warn!(transfer_id = %id, error = %e, "redemption failed, transfer left staged");
                    Err(e)
                }
            },
            previous @ Slot::Consumed { .. } => {
                *slot = previous;
                warn!(transfer_id = %id, "redemption of consumed transfer");
                Err(VeilError::AlreadyConsumed)
            }
            previous @ Slot::Expired { .. } => {
                *slot = previous;
                Err(VeilError::Expired)
            }
        }
    }

    /// Drop ciphertext of records past their TTL and forget old tombstones.
    /// Returns how many slots changed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut slots = self.lock();
        self.sweep(&mut slots, now)
    }

    fn sweep(&self, slots: &mut HashMap<String, Slot>, now: u64) -> usize {
        let grace = millis(self.tombstone_grace);
        let before = slots.len();
        slots.retain(|_, slot| slot.age(now) <= millis(slot.ttl()).saturating_add(grace));
        let mut changed = before - slots.len();

        for slot in slots.values_mut() {
            if matches!(slot, Slot::Live { .. }) && slot.is_past_ttl(now) {
                *slot = Slot::Expired {
                    created_at: slot.created_at(),
                    ttl: slot.ttl(),
                };
                changed += 1;
            }
        }
        if changed > 0 {
            debug!(changed, remaining = slots.len(), "purged expired transfers");
        }
        changed
    }

    /// Slots currently held, tombstones included
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True if `id` is staged and still redeemable
    pub fn contains(&self, id: &str) -> bool {
        let now = self.clock.now_millis();
        matches!(self.lock().get(id), Some(slot @ Slot::Live { .. }) if !slot.is_past_ttl(now))
    }
}

impl Stager for TransientStore {
    fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn stage(&self, id: &str, record: StoredTransfer, ttl: Duration) -> VeilResult<()> {
        TransientStore::stage(self, id, record, ttl);
        Ok(())
    }

    fn fetch(&self, id: &str) -> VeilResult<StoredTransfer> {
        self.fetch_and_consume(id)
    }

    fn redeem(&self, id: &str, open: &mut OpenFn<'_>) -> VeilResult<Zeroizing<Vec<u8>>> {
        self.fetch_and_consume_with(id, |record| open(record))
    }
}
