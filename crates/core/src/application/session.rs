// Session Binder - session token -> job reuse policy

use super::constants::MAX_SESSION_TOKEN_LEN;
use super::registry::JobRegistry;
use crate::domain::{DomainError, JobId};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Job bound to one token. Its lock serializes binds of that token only.
type Slot = Arc<tokio::sync::Mutex<Option<JobId>>>;

/// Maps caller-supplied session tokens to jobs
///
/// The same token keeps getting the same job while that job is alive; once
/// the job is reclaimed (or stuck degraded) the token gets a fresh one. How
/// tokens are derived is up to the caller.
///
/// The map lock is never held across an `.await`; job creation happens under
/// the token's own slot lock, so binds of unrelated tokens do not queue
/// behind each other's disk I/O.
pub struct SessionBinder {
    registry: Arc<JobRegistry>,
    sessions: Mutex<HashMap<String, Slot>>,
}

fn validate_token(token: &str) -> Result<&str> {
    if token.trim().is_empty() {
        return Err(DomainError::InvalidSessionToken("token is empty".to_string()).into());
    }
    if token.len() > MAX_SESSION_TOKEN_LEN {
        return Err(DomainError::InvalidSessionToken(format!(
            "token longer than {} bytes",
            MAX_SESSION_TOKEN_LEN
        ))
        .into());
    }
    Ok(token)
}

impl SessionBinder {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self {
            registry,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True if `slot` is still the one mapped for `token`
    fn is_current(&self, token: &str, slot: &Slot) -> bool {
        self.sessions()
            .get(token)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Job for `token`, creating one if the token is new or its job is gone
    ///
    /// Concurrent binds of one fresh token end up with a single job.
    pub async fn bind(&self, token: &str) -> Result<JobId> {
        let token = validate_token(token)?;

        loop {
            let slot = Arc::clone(self.sessions().entry(token.to_string()).or_default());
            let mut bound = slot.lock().await;
            // Pruned or unbound while we waited for the slot
            if !self.is_current(token, &slot) {
                continue;
            }

            if let Some(job_id) = bound.as_ref() {
                if self.registry.touch(job_id) {
                    debug!(job_id = %job_id, "Session reused existing job");
                    return Ok(job_id.clone());
                }
                debug!(job_id = %job_id, "Session job no longer live, allocating a new one");
            }

            match self.registry.create_job().await {
                Ok(job) => {
                    *bound = Some(job.id.clone());
                    info!(job_id = %job.id, "Session bound to new job");
                    return Ok(job.id);
                }
                Err(e) => {
                    if bound.is_none() {
                        let mut sessions = self.sessions();
                        if sessions.get(token).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                            sessions.remove(token);
                        }
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Forget a token. Returns the job it pointed to, if any.
    pub async fn unbind(&self, token: &str) -> Option<JobId> {
        let slot = self.sessions().remove(token)?;
        let bound = slot.lock().await;
        bound.clone()
    }

    /// Current mapping for a token, without touching the job
    pub async fn lookup(&self, token: &str) -> Option<JobId> {
        let slot = self.sessions().get(token).cloned()?;
        let bound = slot.lock().await;
        bound.clone()
    }

    /// Drop mappings whose job left the registry. Returns how many went.
    /// Tokens with a bind in progress are left alone.
    pub async fn prune(&self) -> usize {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(bound) => bound
                .as_ref()
                .is_some_and(|job_id| self.registry.contains(job_id)),
            Err(_) => true,
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!(pruned, "Pruned stale session mappings");
        }
        pruned
    }

    pub async fn session_count(&self) -> usize {
        self.sessions().len()
    }
}
