//! Single-use, time-bounded challenge nonces.
//!
//! Challenges back the possession-factor handshake: the server issues a
//! random nonce bound to a subject, the client signs it, and the server
//! consumes it on verification. Consumption removes the nonce before
//! checking anything else, so a challenge can never be redeemed twice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use cadenas_crypto_core::token::generate_token;

use crate::error::VaultError;

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Pending challenge record.
#[derive(Debug, Clone)]
pub struct PendingChallenge {
    /// The random nonce handed to the client.
    pub nonce: String,
    /// UNIX seconds at issuance.
    pub issued_at: u64,
}

/// Storage backend for pending challenges.
///
/// Implementations must make `take` atomic with respect to concurrent
/// callers: at most one caller observes a given challenge.
pub trait ChallengeBackend: Send + Sync {
    /// Store (or replace) the pending challenge for `subject`.
    fn insert(&self, subject: &str, challenge: PendingChallenge);

    /// Remove and return the pending challenge for `subject`, if any.
    fn take(&self, subject: &str) -> Option<PendingChallenge>;

    /// Drop every challenge issued before `cutoff` (UNIX seconds).
    fn sweep(&self, cutoff: u64);
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// Process-local backend over a mutex-guarded map.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, PendingChallenge>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingChallenge>> {
        // A poisoned mutex only means another thread panicked mid-write;
        // the map itself stays usable.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ChallengeBackend for MemoryBackend {
    fn insert(&self, subject: &str, challenge: PendingChallenge) {
        self.lock().insert(subject.to_owned(), challenge);
    }

    fn take(&self, subject: &str) -> Option<PendingChallenge> {
        self.lock().remove(subject)
    }

    fn sweep(&self, cutoff: u64) {
        self.lock().retain(|_, c| c.issued_at >= cutoff);
    }
}

// ---------------------------------------------------------------------------
// ChallengeStore
// ---------------------------------------------------------------------------

/// Issues and consumes single-use challenges with a fixed TTL.
pub struct ChallengeStore {
    backend: Arc<dyn ChallengeBackend>,
    ttl_secs: u64,
}

impl std::fmt::Debug for ChallengeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeStore")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl ChallengeStore {
    /// Create a store over `backend` with the given TTL.
    #[must_use]
    pub fn new(backend: Arc<dyn ChallengeBackend>, ttl_secs: u64) -> Self {
        Self { backend, ttl_secs }
    }

    /// Create a store over a fresh [`MemoryBackend`].
    #[must_use]
    pub fn in_memory(ttl_secs: u64) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), ttl_secs)
    }

    /// Issue a fresh challenge for `subject`, replacing any pending one.
    ///
    /// Returns the nonce to hand to the client.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Crypto`] if random generation fails.
    pub fn issue(&self, subject: &str, now: u64) -> Result<String, VaultError> {
        let nonce = generate_token()?;
        self.backend.insert(
            subject,
            PendingChallenge {
                nonce: nonce.clone(),
                issued_at: now,
            },
        );
        Ok(nonce)
    }

    /// Consume the pending challenge for `subject`.
    ///
    /// The challenge is removed unconditionally before any check, then
    /// `true` is returned only if `nonce` matches and the TTL has not
    /// elapsed. A mismatched or expired attempt still burns the
    /// challenge.
    pub fn consume(&self, subject: &str, nonce: &str, now: u64) -> bool {
        let Some(pending) = self.backend.take(subject) else {
            return false;
        };
        let fresh = now.saturating_sub(pending.issued_at) < self.ttl_secs;
        fresh && pending.nonce == nonce
    }

    /// Drop every challenge older than the TTL as of `now`.
    pub fn sweep(&self, now: u64) {
        self.backend.sweep(now.saturating_sub(self.ttl_secs));
    }
}

// ---------------------------------------------------------------------------
// Background sweeper
// ---------------------------------------------------------------------------

/// Handle to a background sweep thread. Stops and joins on drop.
pub struct SweeperGuard {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for SweeperGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SweeperGuard")
    }
}

impl Drop for SweeperGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Spawn a thread that sweeps `store` every `interval`.
///
/// The returned guard stops the thread when dropped.
#[must_use]
pub fn start_sweeper(store: Arc<ChallengeStore>, interval: Duration) -> SweeperGuard {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let handle = std::thread::spawn(move || {
        while !stop_flag.load(Ordering::Relaxed) {
            std::thread::sleep(interval);
            if stop_flag.load(Ordering::Relaxed) {
                break;
            }
            store.sweep(crate::util::now_unix_secs());
        }
    });

    SweeperGuard {
        stop,
        handle: Some(handle),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
