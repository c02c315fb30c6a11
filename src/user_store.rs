use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use thiserror::Error;
use tracing::{debug, instrument};

/// Contact identifier an identity registers with. Exactly one method per
/// identity; registration by email never sets phone and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Contact {
    Email(String),
    Phone(String),
}

impl Contact {
    /// The raw identifier value
    pub fn value(&self) -> &str {
        match self {
            Contact::Email(email) => email,
            Contact::Phone(phone) => phone,
        }
    }
}

/// Persisted identity row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    /// Unique user id, assigned at creation
    pub id: i64,
    /// Email address, unique when present
    pub email: Option<String>,
    /// Phone number, unique when present
    pub phone: Option<String>,
    /// Password hash, never serialized outward
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// When the identity was created
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// The contact identifier this identity registered with
    pub fn contact(&self) -> &str {
        self.email
            .as_deref()
            .or(self.phone.as_deref())
            .unwrap_or_default()
    }
}

/// Store failure, with uniqueness violations surfaced distinctly so callers
/// can treat them as the domain conflict they are.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("contact identifier already registered")]
    UniqueViolation,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Credential store adapter over the user and profile-link tables
#[derive(Clone)]
pub struct UserStore {
    pool: PgPool,
}

impl UserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Look up an identity by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, email, phone, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// Look up an identity by phone number
    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, email, phone, password_hash, created_at
            FROM users
            WHERE phone = $1
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
    }

    /// Look up an identity by contact identifier
    pub async fn find_by_contact(
        &self,
        contact: &Contact,
    ) -> Result<Option<UserRecord>, sqlx::Error> {
        match contact {
            Contact::Email(email) => self.find_by_email(email).await,
            Contact::Phone(phone) => self.find_by_phone(phone).await,
        }
    }

    /// Insert a new identity together with its profile-link row.
    ///
    /// Both inserts run in one transaction: either the identity and its
    /// profile link commit together or neither does. The table's uniqueness
    /// constraint is the real guard against concurrent registration of the
    /// same identifier; a violation maps to [`StoreError::UniqueViolation`].
    #[instrument(skip(self, password_hash), fields(contact = %contact.value()))]
    pub async fn insert_user(
        &self,
        contact: &Contact,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = match contact {
            Contact::Email(_) => {
                r#"
                INSERT INTO users (email, password_hash)
                VALUES ($1, $2)
                RETURNING id, email, phone, password_hash, created_at
                "#
            }
            Contact::Phone(_) => {
                r#"
                INSERT INTO users (phone, password_hash)
                VALUES ($1, $2)
                RETURNING id, email, phone, password_hash, created_at
                "#
            }
        };

        let user = sqlx::query_as::<_, UserRecord>(query)
            .bind(contact.value())
            .bind(password_hash)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_unique_violation)?;

        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, contact)
            VALUES ($1, $2)
            "#,
        )
        .bind(user.id)
        .bind(contact.value())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(user_id = user.id, "Identity created");

        Ok(user)
    }
}

fn map_unique_violation(err: sqlx::Error) -> StoreError {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => StoreError::UniqueViolation,
        _ => StoreError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_value() {
        assert_eq!(Contact::Email("a@b.c".to_string()).value(), "a@b.c");
        assert_eq!(Contact::Phone("+628123".to_string()).value(), "+628123");
    }

    #[test]
    fn test_user_record_contact() {
        let user = UserRecord {
            id: 1,
            email: Some("a@b.c".to_string()),
            phone: None,
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(user.contact(), "a@b.c");

        let user = UserRecord {
            id: 2,
            email: None,
            phone: Some("+628123".to_string()),
            password_hash: "hash".to_string(),
            created_at: Utc::now(),
        };
        assert_eq!(user.contact(), "+628123");
    }

    #[test]
    fn test_password_hash_not_serialized() {
        let user = UserRecord {
            id: 1,
            email: Some("a@b.c".to_string()),
            phone: None,
            password_hash: "super-secret-hash".to_string(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("super-secret-hash"));
        assert!(!json.contains("password_hash"));
    }
}
