use std::time::{Duration, Instant};

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use tracing::{info, warn};

use crate::config::LockConfig;
use crate::error::{Result, UnibosError};

pub fn hash_passphrase(passphrase: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| UnibosError::Passphrase(err.to_string()))
}

pub fn verify_passphrase(passphrase: &str, phc_hash: &str) -> Result<bool> {
    let parsed =
        PasswordHash::new(phc_hash).map_err(|err| UnibosError::Passphrase(err.to_string()))?;
    Ok(Argon2::default()
        .verify_password(passphrase.as_bytes(), &parsed)
        .is_ok())
}

/// A configured hash that does not parse would reject every unlock attempt,
/// so it is refused before the session starts.
pub fn check_passphrase_hash(config: &LockConfig) -> Result<()> {
    let hash = config.passphrase_hash.trim();
    if hash.is_empty() {
        return Ok(());
    }
    PasswordHash::new(hash)
        .map(|_| ())
        .map_err(|err| UnibosError::Passphrase(err.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    Unlocked,
    Rejected,
}

#[derive(Debug)]
pub struct ScreenLock {
    enabled: bool,
    idle_timeout: Option<Duration>,
    passphrase_hash: Option<String>,
    locked: bool,
    prompt_open: bool,
    failed_attempts: u32,
    last_activity: Instant,
}

impl ScreenLock {
    pub fn from_config(config: &LockConfig) -> Self {
        Self {
            enabled: config.enabled,
            idle_timeout: (config.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(config.idle_timeout_secs)),
            passphrase_hash: Some(config.passphrase_hash.trim().to_string())
                .filter(|hash| !hash.is_empty()),
            locked: false,
            prompt_open: false,
            failed_attempts: 0,
            last_activity: Instant::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_prompt_open(&self) -> bool {
        self.prompt_open
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn has_passphrase(&self) -> bool {
        self.passphrase_hash.is_some()
    }

    pub fn lock(&mut self) -> bool {
        if !self.enabled || self.locked {
            return false;
        }
        self.locked = true;
        self.prompt_open = false;
        info!("screen locked");
        true
    }

    pub fn record_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Locks when the idle timeout has elapsed. Returns true if it locked.
    pub fn check_idle(&mut self, now: Instant) -> bool {
        let Some(timeout) = self.idle_timeout else {
            return false;
        };
        if now.saturating_duration_since(self.last_activity) >= timeout {
            return self.lock();
        }
        false
    }

    pub fn open_prompt(&mut self) {
        if self.locked {
            self.prompt_open = true;
        }
    }

    pub fn cancel_prompt(&mut self) {
        self.prompt_open = false;
    }

    pub fn try_unlock(&mut self, passphrase: &str, now: Instant) -> UnlockOutcome {
        if !self.locked {
            return UnlockOutcome::Unlocked;
        }
        let accepted = match self.passphrase_hash.as_deref() {
            None => true,
            Some(hash) => match verify_passphrase(passphrase, hash) {
                Ok(matches) => matches,
                Err(err) => {
                    warn!("configured lock hash is unusable: {err}");
                    false
                }
            },
        };
        if accepted {
            self.locked = false;
            self.prompt_open = false;
            self.failed_attempts = 0;
            self.last_activity = now;
            info!("screen unlocked");
            UnlockOutcome::Unlocked
        } else {
            self.failed_attempts = self.failed_attempts.saturating_add(1);
            warn!(attempts = self.failed_attempts, "unlock rejected");
            UnlockOutcome::Rejected
        }
    }
}
