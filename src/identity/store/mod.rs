//! Persistence seams for identities and issued passcodes.
//!
//! Both stores are behind object-safe traits so the workflow can run against
//! PostgreSQL in production and an in-memory map in tests. Uniqueness of email
//! and username is the store's job: a duplicate insert reports
//! [`InsertOutcome::Conflict`] instead of an error, which the verification
//! controller treats as "already registered".

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use super::model::{IdentityRecord, NewIdentity, PasscodeRecord};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryIdentityStore, MemoryPasscodeStore};
pub use postgres::{PgIdentityStore, PgPasscodeStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(IdentityRecord),
    Conflict,
}

pub trait IdentityStore: Send + Sync {
    /// Insert a new identity, reporting a conflict when email or username is taken.
    fn insert<'a>(&'a self, identity: &'a NewIdentity) -> BoxFuture<'a, Result<InsertOutcome>>;

    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<IdentityRecord>>>;

    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<IdentityRecord>>>;
}

pub trait PasscodeStore: Send + Sync {
    fn insert<'a>(&'a self, record: &'a PasscodeRecord) -> BoxFuture<'a, Result<()>>;

    /// Most recently created record matching the session id and code hash.
    fn find_latest<'a>(
        &'a self,
        session_id: &'a str,
        code_hash: &'a [u8],
    ) -> BoxFuture<'a, Result<Option<PasscodeRecord>>>;
}
