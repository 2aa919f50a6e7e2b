//! Argon2id password verification
//!
//! The lock password is stored as a PHC-format Argon2id hash in its own
//! file. The file is re-read on every check so `keyguardctl set-password`
//! takes effect without restarting the daemon.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString},
    Argon2,
};
use std::path::{Path, PathBuf};
use tracing::warn;
use zeroize::Zeroizing;

use keyguard_core::PasswordAttemptTracker;

use crate::adapters::PasswordVerifier;
use crate::error::{DaemonError, Result};

/// Verifies candidates against the stored Argon2id hash
#[derive(Debug, Clone)]
pub struct Argon2PasswordVerifier {
    hash_path: PathBuf,
}

impl Argon2PasswordVerifier {
    pub fn new(hash_path: impl Into<PathBuf>) -> Self {
        Self {
            hash_path: hash_path.into(),
        }
    }

    /// Whether a password has been set
    pub fn is_set(&self) -> bool {
        self.hash_path.exists()
    }

    fn check(&self, candidate: &str) -> Result<bool> {
        let stored = std::fs::read_to_string(&self.hash_path)?;
        let parsed = PasswordHash::new(stored.trim())
            .map_err(|e| DaemonError::Password(format!("Invalid stored hash: {}", e)))?;

        let candidate = Zeroizing::new(candidate.as_bytes().to_vec());
        Ok(Argon2::default()
            .verify_password(&candidate, &parsed)
            .is_ok())
    }
}

impl PasswordVerifier for Argon2PasswordVerifier {
    fn matches(&self, candidate: &str) -> bool {
        match self.check(candidate) {
            Ok(matched) => matched,
            Err(e) => {
                // No usable hash means nothing matches
                warn!("Password check failed: {}", e);
                false
            }
        }
    }
}

/// Hash `password` with a fresh salt
pub fn hash_password(password: &str) -> Result<String> {
    PasswordAttemptTracker::validate_length(password)?;

    let salt = SaltString::generate(&mut OsRng);
    let bytes = Zeroizing::new(password.as_bytes().to_vec());

    let hash = Argon2::default()
        .hash_password(&bytes, &salt)
        .map_err(|e| DaemonError::Password(format!("Failed to hash password: {}", e)))?
        .to_string();

    Ok(hash)
}

/// Hash `password` and write it to `path`, readable only by the owner
pub fn store_password(path: &Path, password: &str) -> Result<()> {
    let hash = hash_password(password)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, hash)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}
