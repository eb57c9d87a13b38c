//! Account identity and credential generation.
//!
//! Credentials are persisted as argon2id hashes. The plain credential is handed to the
//! registering client once and can't be recovered from storage.
use crate::error::Error;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

pub const CREDENTIAL_LEN: usize = 40;

/// Freshly issued account secrets.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub identity: Uuid,
    pub subdomain: String,
    pub secret: String,
    pub secret_hash: String,
}

impl Credentials {
    /// Draw a new identity, subdomain and credential, hashing the credential.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Credential`] if the credential can't be hashed.
    pub fn generate() -> Result<Self, Error> {
        let secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(CREDENTIAL_LEN)
            .map(char::from)
            .collect();
        let secret_hash = hash(&secret)?;
        Ok(Self {
            identity: Uuid::new_v4(),
            subdomain: Uuid::new_v4().hyphenated().to_string(),
            secret,
            secret_hash,
        })
    }
}

/// Hash a credential with argon2id and a random salt.
///
/// # Errors
///
/// Returns [`Error::Credential`] if hashing fails.
pub fn hash(secret: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| Error::Credential(err.to_string()))
}

/// Verify a credential against a stored hash.
///
/// New hashes are argon2 PHC strings. Accounts carried over from older deployments hold
/// bcrypt (`$2a$`, `$2b$`, `$2y$`) hashes, which are checked with bcrypt. Anything else never
/// verifies.
#[must_use]
pub fn verify(secret: &str, stored_hash: &str) -> bool {
    if stored_hash.starts_with("$2") {
        return bcrypt::verify(secret, stored_hash).unwrap_or_else(|err| {
            tracing::warn!("unusable stored bcrypt hash: {err}");
            false
        });
    }
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            tracing::warn!("unusable stored credential hash: {err}");
            false
        }
    }
}
