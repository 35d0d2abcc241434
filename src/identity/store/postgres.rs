//! PostgreSQL-backed stores.

use anyhow::{Context, Result, anyhow};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use super::{BoxFuture, IdentityStore, InsertOutcome, PasscodeStore};
use crate::identity::clock::Clock;
use crate::identity::model::{IdentityRecord, NewIdentity, PasscodeRecord, Role};

const SCHEMA: &str = include_str!("../../../sql/schema.sql");

/// Create the identity and passcode tables when they do not exist yet.
///
/// # Errors
/// Returns an error if any statement fails.
pub async fn apply_schema(pool: &PgPool) -> Result<()> {
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DDL",
        db.statement = "schema.sql"
    );
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to apply schema")?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn identity_from_row(row: &PgRow) -> Result<IdentityRecord> {
    let role: String = row.get("role");
    let role: Role = role
        .parse()
        .map_err(|_| anyhow!("unknown role in identities row: {role}"))?;
    Ok(IdentityRecord {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        middle_name: row.get("middle_name"),
        last_name: row.get("last_name"),
        role,
        created_at: row.get("created_at"),
    })
}

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn select_one(&self, query: &'static str, bind: BindValue<'_>) -> Result<Option<IdentityRecord>> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let statement = sqlx::query(query);
        let statement = match bind {
            BindValue::Text(value) => statement.bind(value),
            BindValue::Id(value) => statement.bind(value),
        };
        let row = statement
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity")?;
        row.as_ref().map(identity_from_row).transpose()
    }
}

enum BindValue<'a> {
    Text(&'a str),
    Id(Uuid),
}

impl IdentityStore for PgIdentityStore {
    fn insert<'a>(&'a self, identity: &'a NewIdentity) -> BoxFuture<'a, Result<InsertOutcome>> {
        Box::pin(async move {
            let query = r"
                INSERT INTO identities
                    (id, email, username, first_name, middle_name, last_name, role, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id, email, username, first_name, middle_name, last_name, role, created_at
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(Uuid::now_v7())
                .bind(&identity.email)
                .bind(&identity.username)
                .bind(&identity.first_name)
                .bind(identity.middle_name.as_deref())
                .bind(&identity.last_name)
                .bind(identity.role.as_str())
                .bind(self.clock.now())
                .fetch_one(&self.pool)
                .instrument(span)
                .await;

            match row {
                Ok(row) => Ok(InsertOutcome::Created(identity_from_row(&row)?)),
                Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
                Err(err) => Err(err).context("failed to insert identity"),
            }
        })
    }

    fn find_by_email<'a>(&'a self, email: &'a str) -> BoxFuture<'a, Result<Option<IdentityRecord>>> {
        Box::pin(self.select_one(
            "SELECT id, email, username, first_name, middle_name, last_name, role, created_at FROM identities WHERE email = $1",
            BindValue::Text(email),
        ))
    }

    fn find_by_id(&self, id: Uuid) -> BoxFuture<'_, Result<Option<IdentityRecord>>> {
        Box::pin(self.select_one(
            "SELECT id, email, username, first_name, middle_name, last_name, role, created_at FROM identities WHERE id = $1",
            BindValue::Id(id),
        ))
    }
}

#[derive(Clone)]
pub struct PgPasscodeStore {
    pool: PgPool,
}

impl PgPasscodeStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl PasscodeStore for PgPasscodeStore {
    fn insert<'a>(&'a self, record: &'a PasscodeRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let query = r"
                INSERT INTO passcodes
                    (email, code_hash, session_id, expires_at, created_at)
                VALUES ($1, $2, $3, $4, $5)
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "INSERT",
                db.statement = query
            );
            sqlx::query(query)
                .bind(&record.email)
                .bind(&record.code_hash)
                .bind(&record.session_id)
                .bind(record.expires_at)
                .bind(record.created_at)
                .execute(&self.pool)
                .instrument(span)
                .await
                .context("failed to insert passcode")?;
            Ok(())
        })
    }

    fn find_latest<'a>(
        &'a self,
        session_id: &'a str,
        code_hash: &'a [u8],
    ) -> BoxFuture<'a, Result<Option<PasscodeRecord>>> {
        Box::pin(async move {
            let query = r"
                SELECT email, code_hash, session_id, expires_at, created_at
                FROM passcodes
                WHERE session_id = $1 AND code_hash = $2
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            ";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT",
                db.statement = query
            );
            let row = sqlx::query(query)
                .bind(session_id)
                .bind(code_hash)
                .fetch_optional(&self.pool)
                .instrument(span)
                .await
                .context("failed to lookup passcode")?;

            Ok(row.map(|row| PasscodeRecord {
                email: row.get("email"),
                code_hash: row.get("code_hash"),
                session_id: row.get("session_id"),
                expires_at: row.get("expires_at"),
                created_at: row.get("created_at"),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_maps_to_conflict_code() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError { code: None }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn schema_declares_unique_email_and_username() {
        assert!(SCHEMA.contains("identities_email_key ON identities (email)"));
        assert!(SCHEMA.contains("identities_username_key ON identities (username)"));
        assert!(SCHEMA.contains("code_hash BYTEA NOT NULL"));
    }
}
