use std::sync::Arc;

use anyhow::Context;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            normalize_email, AuthResponse, LoginRequest, RegisterRequest, UserResponse,
            TOKEN_TYPE,
        },
        jwt::TokenCodec,
        password::PasswordHasher,
        repo::UserStore,
        repo_types::User,
    },
    error::AuthError,
};

/// Register, login and profile lookup over an injected store, hasher and token codec.
pub struct CredentialService {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    tokens: TokenCodec,
}

impl CredentialService {
    pub fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher, tokens: TokenCodec) -> Self {
        Self {
            store,
            hasher,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    #[instrument(skip_all, fields(email = %req.email))]
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, AuthError> {
        req.validate()?;
        let email = normalize_email(&req.email);
        info!("registration attempt");

        if req.password != req.password_confirm {
            warn!("password confirmation does not match");
            return Err(AuthError::Validation("Passwords do not match".into()));
        }

        if self.store.exists_by_email(&email).await? {
            warn!("email already registered");
            return Err(AuthError::Validation("Email is already registered".into()));
        }

        let hash = self.hash_password(req.password).await?;
        let user = User::new(req.name.trim().to_string(), email, hash);
        let user = self.store.insert(user).await.map_err(|e| {
            warn!(error = %e, "user insert rejected");
            AuthError::from(e)
        })?;

        info!(user_id = %user.id, "user registered");
        self.auth_response(&user)
    }

    #[instrument(skip_all, fields(email = %req.email))]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, AuthError> {
        req.validate()?;
        let email = normalize_email(&req.email);
        info!("login attempt");

        let Some(user) = self.store.find_by_email_active(&email).await? else {
            warn!("login unknown or inactive email");
            return Err(AuthError::Unauthorized);
        };

        if !self.verify_password(req.password, user.password_hash.clone()).await? {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::Unauthorized);
        }

        info!(user_id = %user.id, "user logged in");
        self.auth_response(&user)
    }

    #[instrument(skip(self))]
    pub async fn get_user_by_id(&self, id: Uuid) -> Result<UserResponse, AuthError> {
        match self.store.find_by_id(id).await? {
            Some(user) => Ok(UserResponse::from(user)),
            None => Err(AuthError::NotFound),
        }
    }

    fn auth_response(&self, user: &User) -> Result<AuthResponse, AuthError> {
        let token = self
            .tokens
            .issue(user.id, &user.email)
            .context("sign session token")?;
        Ok(AuthResponse {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            token,
            token_type: TOKEN_TYPE.to_string(),
            expires_in: self.tokens.expires_in_secs(),
        })
    }

    // Argon2 is deliberately slow; keep it off the async workers.
    async fn hash_password(&self, plain: String) -> Result<String, AuthError> {
        let hasher = self.hasher.clone();
        let hash = tokio::task::spawn_blocking(move || hasher.hash(&plain))
            .await
            .context("join hash_password task")??;
        Ok(hash)
    }

    async fn verify_password(&self, plain: String, hash: String) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let ok = tokio::task::spawn_blocking(move || hasher.verify(&plain, &hash))
            .await
            .context("join verify_password task")?;
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::{MemoryUserStore, StoreError};
    use async_trait::async_trait;
    use std::time::Duration;

    fn service_with(store: Arc<dyn UserStore>) -> CredentialService {
        CredentialService::new(
            store,
            PasswordHasher::fast_insecure(),
            TokenCodec::new("test-secret", Duration::from_secs(3600)),
        )
    }

    fn register_req(email: &str, password: &str, confirm: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ana".into(),
            email: email.into(),
            password: password.into(),
            password_confirm: confirm.into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn register_then_login_returns_same_subject() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = service_with(store.clone());

        let registered = svc
            .register(register_req("ana@example.com", "Secret123", "Secret123"))
            .await
            .expect("register");
        assert!(!registered.token.is_empty());
        assert_eq!(registered.token_type, "Bearer");
        assert_eq!(registered.expires_in, 3600);
        assert_eq!(registered.name, "Ana");

        let logged_in = svc
            .login(login_req("ana@example.com", "Secret123"))
            .await
            .expect("login");
        assert_eq!(logged_in.id, registered.id);

        let claims = svc.tokens().verify(&logged_in.token).expect("verify");
        assert_eq!(claims.sub, registered.id);
        assert_eq!(claims.email, "ana@example.com");
    }

    #[tokio::test]
    async fn stored_hash_is_not_the_password() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = service_with(store.clone());
        let res = svc
            .register(register_req("ana@example.com", "Secret123", "Secret123"))
            .await
            .unwrap();
        let user = store.find_by_id(res.id).await.unwrap().unwrap();
        assert_ne!(user.password_hash, "Secret123");
        assert!(user.active);
        assert_eq!(user.created_at, user.updated_at);
    }

    #[tokio::test]
    async fn mismatched_confirmation_writes_nothing() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = service_with(store.clone());
        let err = svc
            .register(register_req("ana@example.com", "Secret123", "Secret124"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = service_with(store.clone());
        svc.register(register_req("ana@example.com", "Secret123", "Secret123"))
            .await
            .unwrap();
        let err = svc
            .register(register_req("ANA@example.com ", "Other456", "Other456"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
        assert_eq!(store.len().await, 1);
    }

    /// Store whose existence check always misses, so only `insert` guards uniqueness.
    struct BlindExistsStore(MemoryUserStore);

    #[async_trait]
    impl UserStore for BlindExistsStore {
        async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            self.0.find_by_id(id).await
        }
        async fn find_by_email_active(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.0.find_by_email_active(email).await
        }
        async fn exists_by_email(&self, _email: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn insert(&self, user: User) -> Result<User, StoreError> {
            self.0.insert(user).await
        }
    }

    #[tokio::test]
    async fn store_constraint_rejects_duplicate_when_check_races() {
        let svc = service_with(Arc::new(BlindExistsStore(MemoryUserStore::new())));
        svc.register(register_req("ana@example.com", "Secret123", "Secret123"))
            .await
            .unwrap();
        let err = svc
            .register(register_req("ana@example.com", "Secret123", "Secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let svc = service_with(Arc::new(MemoryUserStore::new()));
        svc.register(register_req("ana@example.com", "Secret123", "Secret123"))
            .await
            .unwrap();

        let wrong = svc
            .login(login_req("ana@example.com", "wrong"))
            .await
            .unwrap_err();
        let unknown = svc
            .login(login_req("nobody@example.com", "Secret123"))
            .await
            .unwrap_err();
        assert!(matches!(wrong, AuthError::Unauthorized));
        assert!(matches!(unknown, AuthError::Unauthorized));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn inactive_user_cannot_login() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = service_with(store.clone());
        let hash = PasswordHasher::fast_insecure().hash("Secret123").unwrap();
        let mut user = User::new("Off".into(), "off@example.com".into(), hash);
        user.active = false;
        store.insert(user).await.unwrap();

        let err = svc
            .login(login_req("off@example.com", "Secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized));
    }

    #[tokio::test]
    async fn login_ignores_email_case() {
        let svc = service_with(Arc::new(MemoryUserStore::new()));
        svc.register(register_req("Ana@Example.com", "Secret123", "Secret123"))
            .await
            .unwrap();
        let res = svc
            .login(login_req("ana@EXAMPLE.com", "Secret123"))
            .await
            .unwrap();
        assert_eq!(res.email, "ana@example.com");
    }

    #[tokio::test]
    async fn get_user_by_id_returns_profile_or_not_found() {
        let svc = service_with(Arc::new(MemoryUserStore::new()));
        let res = svc
            .register(register_req("ana@example.com", "Secret123", "Secret123"))
            .await
            .unwrap();

        let profile = svc.get_user_by_id(res.id).await.unwrap();
        assert_eq!(profile.id, res.id);
        assert_eq!(profile.email, "ana@example.com");
        assert!(profile.active);

        let err = svc.get_user_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    struct DownStore;

    #[async_trait]
    impl UserStore for DownStore {
        async fn find_by_id(&self, _id: Uuid) -> Result<Option<User>, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
        }
        async fn find_by_email_active(&self, _email: &str) -> Result<Option<User>, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
        }
        async fn exists_by_email(&self, _email: &str) -> Result<bool, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
        }
        async fn insert(&self, _user: User) -> Result<User, StoreError> {
            Err(StoreError::Backend(anyhow::anyhow!("connection refused")))
        }
    }

    #[tokio::test]
    async fn store_failures_become_opaque_internal_errors() {
        let svc = service_with(Arc::new(DownStore));
        let err = svc
            .login(login_req("ana@example.com", "Secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert!(!err.to_string().contains("connection refused"));
    }
}
