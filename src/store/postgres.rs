/// Postgres-backed stores.
///
/// Refresh tokens are kept as SHA-256 fingerprints; the revoked flag is
/// flipped with a conditional UPDATE so the affected-row count doubles as
/// the compare-and-set result.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{hash_token, NewUser, RefreshTokenRecord, Role, User, VerificationToken};
use crate::error::{AppError, AuthError, DatabaseError};
use crate::store::{CredentialStore, RefreshTokenLedger, VerificationStore};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    username: String,
    password_hash: String,
    is_active: bool,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            is_active: row.is_active,
            role: Role::parse(&row.role)?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VerificationRow {
    id: Uuid,
    user_id: Uuid,
    code: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_used: bool,
}

impl From<VerificationRow> for VerificationToken {
    fn from(row: VerificationRow) -> Self {
        VerificationToken {
            id: row.id,
            user_id: row.user_id,
            code: row.code,
            created_at: row.created_at,
            expires_at: row.expires_at,
            used: row.is_used,
        }
    }
}

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: Uuid,
    user_id: Uuid,
    token_hash: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_revoked: bool,
    revoked_at: Option<DateTime<Utc>>,
}

impl From<RefreshTokenRow> for RefreshTokenRecord {
    fn from(row: RefreshTokenRow) -> Self {
        RefreshTokenRecord {
            id: row.id,
            user_id: row.user_id,
            token_hash: row.token_hash,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            is_revoked: row.is_revoked,
            revoked_at: row.revoked_at,
        }
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, username, password_hash, is_active, role, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, email, username, password_hash, is_active, role, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(User::try_from)
        .transpose()
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, AppError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn insert_user(&self, user: NewUser, now: DateTime<Utc>) -> Result<User, AppError> {
        let user = user.into_user(now);
        sqlx::query(
            r#"
            INSERT INTO users (id, email, username, password_hash, is_active, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.role.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                AppError::Auth(AuthError::EmailAlreadyExists)
            }
            other => other,
        })?;

        Ok(user)
    }

    async fn activate_user(&self, user_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET is_active = true WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VerificationStore for PgStore {
    async fn replace_for_user(&self, token: &VerificationToken) -> Result<(), AppError> {
        // one row per user; the last write wins
        sqlx::query(
            r#"
            INSERT INTO verification_tokens (id, user_id, code, created_at, expires_at, is_used)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO UPDATE
            SET id = EXCLUDED.id,
                code = EXCLUDED.code,
                created_at = EXCLUDED.created_at,
                expires_at = EXCLUDED.expires_at,
                is_used = EXCLUDED.is_used
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.code)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.used)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_user_and_code(
        &self,
        user_id: Uuid,
        code: &str,
    ) -> Result<Option<VerificationToken>, AppError> {
        let row = sqlx::query_as::<_, VerificationRow>(
            r#"
            SELECT id, user_id, code, created_at, expires_at, is_used
            FROM verification_tokens
            WHERE user_id = $1 AND code = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(VerificationToken::from))
    }

    async fn consume(&self, token: &VerificationToken) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM verification_tokens WHERE id = $1")
            .bind(token.id)
            .execute(&mut tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE users SET is_active = true WHERE id = $1")
            .bind(token.user_id)
            .execute(&mut tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl RefreshTokenLedger for PgStore {
    async fn record(
        &self,
        user_id: Uuid,
        token: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, AppError> {
        let record = RefreshTokenRecord::new(user_id, token, issued_at, expires_at);

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, issued_at, expires_at, is_revoked)
            VALUES ($1, $2, $3, $4, $5, false)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.token_hash)
        .bind(record.issued_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AppError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, token_hash, issued_at, expires_at, is_revoked, revoked_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RefreshTokenRecord::from))
    }

    async fn find_all_active_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshTokenRecord>, AppError> {
        let rows = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT id, user_id, token_hash, issued_at, expires_at, is_revoked, revoked_at
            FROM refresh_tokens
            WHERE user_id = $1 AND is_revoked = false
            ORDER BY issued_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RefreshTokenRecord::from).collect())
    }

    async fn revoke(
        &self,
        record: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE id = $2 AND is_revoked = false
            "#,
        )
        .bind(at)
        .bind(record.id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected == 1)
    }

    async fn revoke_all(
        &self,
        records: &[RefreshTokenRecord],
        at: DateTime<Utc>,
    ) -> Result<u64, AppError> {
        if records.is_empty() {
            return Ok(0);
        }
        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();

        let affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE id = ANY($2) AND is_revoked = false
            "#,
        )
        .bind(at)
        .bind(ids)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64, AppError> {
        let affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = true, revoked_at = $1
            WHERE user_id = $2 AND is_revoked = false
            "#,
        )
        .bind(at)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected)
    }
}
