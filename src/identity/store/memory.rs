//! In-memory stores with the same uniqueness rules as the database schema.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BoxFuture, IdentityStore, InsertOutcome, PasscodeStore};
use crate::identity::clock::Clock;
use crate::identity::model::{IdentityRecord, NewIdentity, PasscodeRecord};

pub struct MemoryIdentityStore {
    identities: Mutex<HashMap<Uuid, IdentityRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            identities: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored identities.
    pub async fn len(&self) -> usize {
        self.identities.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.identities.lock().await.is_empty()
    }

    #[cfg(test)]
    pub(crate) async fn remove(&self, id: Uuid) -> Option<IdentityRecord> {
        self.identities.lock().await.remove(&id)
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn insert<'a>(&'a self, identity: &'a NewIdentity) -> BoxFuture<'a, Result<InsertOutcome>> {
        Box::pin(async move {
            // Check and insert under one lock, mirroring the unique indexes.
            let mut identities = self.identities.lock().await;
            let taken = identities.values().any(|existing| {
                existing.email == identity.email || existing.username == identity.username
            });
            if taken {
                return Ok(InsertOutcome::Conflict);
            }

            let record = IdentityRecord {
                id: Uuid::new_v4(),
                email: identity.email.clone(),
                username: identity.username.clone(),
                first_name: identity.first_name.clone(),
                middle_name: identity.middle_name.clone(),
                last_name: identity.last_name.clone(),
                role: identity.role,
                created_at: self.clock.now(),
            };
            identities.insert(record.id, record.clone());
            Ok(InsertOutcome::Created(record))
        })
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<IdentityRecord>>> {
        Box::pin(async move {
            let identities = self.identities.lock().await;
            Ok(identities
                .values()
                .find(|record| record.email == email)
                .cloned())
        })
    }

    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<IdentityRecord>>> {
        Box::pin(async move { Ok(self.identities.lock().await.get(&id).cloned()) })
    }
}

#[derive(Debug, Default)]
pub struct MemoryPasscodeStore {
    records: Mutex<Vec<PasscodeRecord>>,
}

impl MemoryPasscodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

impl PasscodeStore for MemoryPasscodeStore {
    fn insert<'a>(&'a self, record: &'a PasscodeRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.records.lock().await.push(record.clone());
            Ok(())
        })
    }

    fn find_latest<'a>(
        &'a self,
        session_id: &'a str,
        code_hash: &'a [u8],
    ) -> BoxFuture<'a, Result<Option<PasscodeRecord>>> {
        Box::pin(async move {
            let records = self.records.lock().await;
            Ok(records
                .iter()
                .filter(|record| record.session_id == session_id && record.code_hash == code_hash)
                .max_by_key(|record| record.created_at)
                .cloned())
        })
    }
}
