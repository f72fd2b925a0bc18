use std::sync::{Arc, LazyLock};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use courier_db::Database;
use courier_db::models::UserRow;
use courier_types::models::parse_id;
use courier_types::{StoreError, User, UserProfile};

use crate::assets::{AssetHost, ProfilePicture, resolve_profile_pic};
use crate::token::{SessionToken, TokenIssuer};

/// Verified against when the email is unknown, so a miss costs the same
/// Argon2 work as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(b"courier-timing-equaliser", &salt)
        .ok()
        .map(|hash| hash.to_string())
});

/// Owns user records: registration, login and lookups.
pub struct IdentityStore<A> {
    db: Arc<Database>,
    assets: Arc<A>,
    tokens: TokenIssuer,
}

impl<A> IdentityStore<A> {
    /// Run a storage call on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::storage(anyhow::anyhow!("Storage task failed: {}", e)))?
            .map_err(StoreError::storage)
    }
}

impl<A: AssetHost> IdentityStore<A> {
    pub fn new(db: Arc<Database>, assets: Arc<A>, tokens: TokenIssuer) -> Self {
        Self { db, assets, tokens }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        profile_pic: Option<&str>,
    ) -> Result<User, StoreError> {
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(StoreError::validation("Name, email, and password are required"));
        }
        let picture = ProfilePicture::parse(profile_pic)?;

        // Fast path only; the UNIQUE index below is what actually guarantees it.
        let lookup = email.to_owned();
        if self.with_db(move |db| db.get_user_by_email(&lookup)).await?.is_some() {
            return Err(email_taken());
        }

        let password_hash = hash_password(password.to_owned()).await?;

        // Uploaded last so a failed hash never leaves an image behind.
        let uploaded = matches!(picture, ProfilePicture::Image(_));
        let profile_pic = resolve_profile_pic(self.assets.as_ref(), picture)
            .await
            .map_err(StoreError::storage)?;

        let id = Uuid::new_v4().to_string();
        let now = courier_db::format_timestamp(Utc::now());
        let row = UserRow {
            id: id.clone(),
            name: name.to_string(),
            email: email.to_string(),
            password: password_hash,
            profile_pic,
            join_date: now.clone(),
            last_active: now,
            is_active: true,
        };

        let (inserted, row) = self
            .with_db(move |db| db.create_user(&row).map(|inserted| (inserted, row)))
            .await?;
        if !inserted {
            if uploaded {
                warn!("Registration lost the email race; asset {} is unreferenced", row.profile_pic);
            }
            return Err(email_taken());
        }

        info!("Registered user {}", id);
        let stored = self
            .with_db(move |db| db.get_user_by_id(&id))
            .await?
            .ok_or_else(|| StoreError::storage(anyhow::anyhow!("Registered user vanished")))?;
        User::try_from(stored).map_err(StoreError::storage)
    }

    /// Unknown email and wrong password are the same error.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<SessionToken, StoreError> {
        let lookup = email.to_owned();
        let row = self.with_db(move |db| db.get_user_by_email(&lookup)).await?;

        let (user_id, hash) = match row {
            Some(row) => (Some(row.id), Some(row.password)),
            None => (None, None),
        };

        let verified = verify_password(password.to_owned(), hash).await?;

        let user_id = match (user_id, verified) {
            (Some(id), true) => id,
            _ => {
                warn!("Failed login attempt");
                return Err(StoreError::Authentication);
            }
        };

        let id: Uuid = courier_db::models::parse_uuid(&user_id, "user id").map_err(StoreError::storage)?;
        self.with_db(move |db| db.touch_last_active(&user_id, Utc::now()))
            .await?;

        let session = self.tokens.issue(id)?;
        info!("User {} logged in", id);
        Ok(session)
    }

    pub fn get_by_id(&self, id: &str) -> Result<User, StoreError> {
        let id = parse_id(id, "user_id")?;
        let row = self
            .db
            .get_user_by_id(&id.to_string())
            .map_err(StoreError::storage)?
            .ok_or_else(|| StoreError::NotFound("User not found".into()))?;
        User::try_from(row).map_err(StoreError::storage)
    }

    /// Every user, in registration order.
    pub fn list_all(&self) -> Result<Vec<User>, StoreError> {
        self.db
            .list_users()
            .map_err(StoreError::storage)?
            .into_iter()
            .map(|row| User::try_from(row).map_err(StoreError::storage))
            .collect()
    }

    /// Case-insensitive substring match on name. An empty pattern matches
    /// everyone.
    pub fn search(&self, pattern: &str) -> Result<Vec<User>, StoreError> {
        let needle = pattern.to_lowercase();
        let users = self
            .list_all()?
            .into_iter()
            .filter(|user| user.name.to_lowercase().contains(&needle))
            .collect();
        Ok(users)
    }

    pub fn get_profile(&self, id: &str) -> Result<UserProfile, StoreError> {
        self.get_by_id(id).map(UserProfile::from)
    }
}

fn email_taken() -> StoreError {
    StoreError::Conflict("Email already exists".into())
}

async fn hash_password(password: String) -> Result<String, StoreError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))
    })
    .await
    .map_err(|e| StoreError::storage(anyhow::anyhow!("Password hashing task failed: {}", e)))?
    .map_err(StoreError::storage)
}

/// Argon2 compares digests in constant time. Without a stored hash the dummy
/// one is checked instead.
async fn verify_password(password: String, hash: Option<String>) -> Result<bool, StoreError> {
    tokio::task::spawn_blocking(move || {
        let Some(hash) = hash.as_deref().or(DUMMY_HASH.as_deref()) else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .map_err(|e| StoreError::storage(anyhow::anyhow!("Password verification task failed: {}", e)))
}
