use crate::token::{AuthError, TokenService};
use crate::user_store::{Contact, StoreError, UserRecord, UserStore};
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Registration/login failure taxonomy. The first three are domain conflicts
/// (4xx-equivalent, never retried); `Store` covers infrastructure failures.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("contact identifier already registered")]
    AlreadyExists,
    #[error("contact identifier not found")]
    ContactNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("credential store failure")]
    Store(#[source] anyhow::Error),
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            // A concurrent registration won the insert race; equivalent to
            // the pre-check's conflict.
            StoreError::UniqueViolation => AccountError::AlreadyExists,
            StoreError::Database(e) => AccountError::Store(e.into()),
        }
    }
}

impl From<bcrypt::BcryptError> for AccountError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AccountError::Store(err.into())
    }
}

impl From<AuthError> for AccountError {
    fn from(err: AuthError) -> Self {
        AccountError::Store(err.into())
    }
}

/// An authenticated identity with its freshly minted session token
#[derive(Debug)]
pub struct Session {
    pub user: UserRecord,
    pub token: String,
}

/// Check phone format: "+" followed by digits
pub fn is_valid_phone(phone: &str) -> bool {
    static PHONE_RE: OnceLock<Regex> = OnceLock::new();
    PHONE_RE
        .get_or_init(|| Regex::new(r"^\+\d+$").expect("valid phone regex"))
        .is_match(phone)
}

/// Credential persistence the account flows depend on
#[async_trait]
pub trait CredentialSink: Send + Sync {
    async fn find_by_contact(&self, contact: &Contact)
        -> Result<Option<UserRecord>, StoreError>;
    async fn insert_user(
        &self,
        contact: &Contact,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError>;
}

#[async_trait]
impl CredentialSink for UserStore {
    async fn find_by_contact(
        &self,
        contact: &Contact,
    ) -> Result<Option<UserRecord>, StoreError> {
        Ok(UserStore::find_by_contact(self, contact).await?)
    }

    async fn insert_user(
        &self,
        contact: &Contact,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError> {
        UserStore::insert_user(self, contact, password_hash).await
    }
}

/// Registration and authentication flows over the credential store
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn CredentialSink>,
    tokens: Arc<TokenService>,
}

impl AccountService {
    pub fn new(store: Arc<dyn CredentialSink>, tokens: Arc<TokenService>) -> Self {
        Self { store, tokens }
    }

    /// Register a new identity and mint a session token for it.
    ///
    /// The existence pre-check is an optimistic fast path; the table's
    /// uniqueness constraint is the authoritative guard and its violation
    /// maps to the same `AlreadyExists` conflict.
    #[instrument(skip(self, password), fields(contact = %contact.value()))]
    pub async fn register(
        &self,
        contact: Contact,
        password: &str,
    ) -> Result<Session, AccountError> {
        if self.store.find_by_contact(&contact).await?.is_some() {
            return Err(AccountError::AlreadyExists);
        }

        let password_hash = hash(password, DEFAULT_COST)?;

        let user = self.store.insert_user(&contact, &password_hash).await?;
        let token = self.tokens.issue(user.id, contact.value())?;

        info!(user_id = user.id, "User registered");
        metrics::counter!("accounts.registered").increment(1);

        Ok(Session { user, token })
    }

    /// Authenticate an existing identity and mint a session token
    #[instrument(skip(self, password), fields(contact = %contact.value()))]
    pub async fn login(&self, contact: Contact, password: &str) -> Result<Session, AccountError> {
        let user = self
            .store
            .find_by_contact(&contact)
            .await?
            .ok_or(AccountError::ContactNotFound)?;

        if !verify(password, &user.password_hash)? {
            warn!(user_id = user.id, "Password mismatch");
            metrics::counter!("accounts.login_failures").increment(1);
            return Err(AccountError::InvalidCredentials);
        }

        let token = self.tokens.issue(user.id, contact.value())?;

        info!(user_id = user.id, "User logged in");
        metrics::counter!("accounts.logins").increment(1);

        Ok(Session { user, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory credential store enforcing contact uniqueness like the
    /// real table does.
    #[derive(Default)]
    struct FakeUserStore {
        users: Mutex<Vec<UserRecord>>,
        // Simulates losing the insert race after a clean pre-check.
        force_unique_violation: bool,
    }

    impl FakeUserStore {
        fn racing() -> Self {
            Self {
                force_unique_violation: true,
                ..Self::default()
            }
        }

        fn with_user(contact: &Contact, password: &str) -> Self {
            let store = Self::default();
            store.users.lock().unwrap().push(record(
                1,
                contact,
                &hash(password, 4).unwrap(),
            ));
            store
        }

        fn user_count(&self) -> usize {
            self.users.lock().unwrap().len()
        }
    }

    fn record(id: i64, contact: &Contact, password_hash: &str) -> UserRecord {
        UserRecord {
            id,
            email: match contact {
                Contact::Email(e) => Some(e.clone()),
                Contact::Phone(_) => None,
            },
            phone: match contact {
                Contact::Phone(p) => Some(p.clone()),
                Contact::Email(_) => None,
            },
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        }
    }

    #[async_trait]
    impl CredentialSink for FakeUserStore {
        async fn find_by_contact(
            &self,
            contact: &Contact,
        ) -> Result<Option<UserRecord>, StoreError> {
            let users = self.users.lock().unwrap();
            Ok(users
                .iter()
                .find(|u| u.contact() == contact.value())
                .cloned())
        }

        async fn insert_user(
            &self,
            contact: &Contact,
            password_hash: &str,
        ) -> Result<UserRecord, StoreError> {
            let mut users = self.users.lock().unwrap();
            if self.force_unique_violation
                || users.iter().any(|u| u.contact() == contact.value())
            {
                return Err(StoreError::UniqueViolation);
            }

            let user = record(users.len() as i64 + 1, contact, password_hash);
            users.push(user.clone());
            Ok(user)
        }
    }

    fn service(store: Arc<FakeUserStore>) -> AccountService {
        AccountService::new(
            store,
            Arc::new(TokenService::new("test-secret", Duration::from_secs(60))),
        )
    }

    fn email() -> Contact {
        Contact::Email("user@example.com".to_string())
    }

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone("+628123456789"));
        assert!(is_valid_phone("+1"));

        assert!(!is_valid_phone("628123456789"));
        assert!(!is_valid_phone("+62-812"));
        assert!(!is_valid_phone("+62 812"));
        assert!(!is_valid_phone("+"));
        assert!(!is_valid_phone(""));
    }

    #[test]
    fn test_unique_violation_maps_to_already_exists() {
        let err: AccountError = StoreError::UniqueViolation.into();
        assert!(matches!(err, AccountError::AlreadyExists));
    }

    #[tokio::test]
    async fn test_register_creates_identity_and_token() {
        let store = Arc::new(FakeUserStore::default());
        let svc = service(store.clone());

        let session = svc.register(email(), "password123").await.unwrap();

        assert_eq!(session.user.contact(), "user@example.com");
        assert!(!session.token.is_empty());
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_single_identity() {
        let store = Arc::new(FakeUserStore::default());
        let svc = service(store.clone());

        svc.register(email(), "password123").await.unwrap();
        let err = svc.register(email(), "password123").await.unwrap_err();

        // The second attempt conflicts; exactly one identity row exists.
        assert!(matches!(err, AccountError::AlreadyExists));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn test_lost_insert_race_maps_to_conflict() {
        // A competing registration commits between the pre-check and the
        // insert; the uniqueness violation surfaces as the same conflict.
        let store = Arc::new(FakeUserStore::racing());
        let svc = service(store.clone());

        let err = svc.register(email(), "password123").await.unwrap_err();
        assert!(matches!(err, AccountError::AlreadyExists));
        assert_eq!(store.user_count(), 0);
    }

    #[tokio::test]
    async fn test_login_with_correct_password() {
        let store = Arc::new(FakeUserStore::with_user(&email(), "password123"));
        let svc = service(store);

        let session = svc.login(email(), "password123").await.unwrap();
        assert_eq!(session.user.id, 1);
        assert!(!session.token.is_empty());
    }

    #[tokio::test]
    async fn test_login_wrong_password_rejected() {
        let store = Arc::new(FakeUserStore::with_user(&email(), "password123"));
        let svc = service(store.clone());

        let err = svc.login(email(), "wrong-password").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidCredentials));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn test_login_unknown_contact_rejected() {
        let store = Arc::new(FakeUserStore::default());
        let svc = service(store.clone());

        let err = svc.login(email(), "password123").await.unwrap_err();
        assert!(matches!(err, AccountError::ContactNotFound));
        assert_eq!(store.user_count(), 0);
    }
}
