use std::path::Path;

use uuid::Uuid;

use super::subscription::{NewSubscription, Subscription, SubscriptionPatch};

pub fn unix_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store: {0}")]
    Db(#[from] sled::Error),
    #[error("store document: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Subscription documents in sled, one JSON value per `sub:<id>` key.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
}

impl Store {
    const SUB_PREFIX: &'static str = "sub:";

    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    fn key(id: &str) -> String {
        format!("{}{id}", Self::SUB_PREFIX)
    }

    fn put(&self, sub: &Subscription) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(sub)?;
        self.db.insert(Self::key(&sub.id), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<Subscription>, StoreError> {
        let Some(raw) = self.db.get(Self::key(id))? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    pub fn insert(&self, new: NewSubscription) -> Result<Subscription, StoreError> {
        let sub = Subscription {
            id: Uuid::new_v4().simple().to_string(),
            name: new.name,
            price: new.price,
            currency: new.currency,
            billing_date: new.billing_date,
            cycle: new.cycle.as_str().to_string(),
            note: new.note,
            is_advance: new.is_advance,
            self_ratio: new.self_ratio,
            advance_ratio: new.advance_ratio,
            created_at_unix_ms: unix_ms(),
            deleted_at_unix_ms: None,
        };
        self.put(&sub)?;
        Ok(sub)
    }

    /// Read-modify-write on a live document. The write only lands if the stored bytes are
    /// still the ones that were read; otherwise the change is recomputed on the new value.
    fn modify_live(
        &self,
        id: &str,
        mut change: impl FnMut(&mut Subscription),
    ) -> Result<bool, StoreError> {
        let key = Self::key(id);
        loop {
            let Some(raw) = self.db.get(&key)? else {
                return Ok(false);
            };
            let mut sub: Subscription = serde_json::from_slice(&raw)?;
            if sub.is_deleted() {
                return Ok(false);
            }
            change(&mut sub);
            let bytes = serde_json::to_vec(&sub)?;
            if self
                .db
                .compare_and_swap(&key, Some(raw), Some(bytes))?
                .is_ok()
            {
                self.db.flush()?;
                return Ok(true);
            }
        }
    }

    /// Applies `patch` to a live document. Returns false for unknown or deleted ids.
    pub fn update(&self, id: &str, patch: &SubscriptionPatch) -> Result<bool, StoreError> {
        self.modify_live(id, |sub| patch.apply(sub))
    }

    /// Marks a document deleted; it stays on disk but drops out of listings.
    pub fn soft_delete(&self, id: &str) -> Result<bool, StoreError> {
        self.modify_live(id, |sub| sub.deleted_at_unix_ms = Some(unix_ms()))
    }

    /// Live subscriptions, newest first. Undecodable documents are skipped.
    pub fn list_active(&self) -> Result<Vec<Subscription>, StoreError> {
        let mut out = Vec::new();
        for res in self.db.scan_prefix(Self::SUB_PREFIX) {
            let (k, v) = res?;
            match serde_json::from_slice::<Subscription>(&v) {
                Ok(sub) if !sub.is_deleted() => out.push(sub),
                Ok(_) => {}
                Err(e) => {
                    log::warn!(
                        "skipping unreadable subscription {}: {e}",
                        String::from_utf8_lossy(&k)
                    );
                }
            }
        }
        out.sort_by(|a, b| b.created_at_unix_ms.cmp(&a.created_at_unix_ms));
        Ok(out)
    }
}

pub fn open_store_dir(base: &Path) -> anyhow::Result<Store> {
    let path = base.join("sled");
    std::fs::create_dir_all(&path)?;
    Ok(Store::open(&path)?)
}
