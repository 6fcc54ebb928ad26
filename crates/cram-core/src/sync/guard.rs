//! Checks that must pass before a cycle touches the remote store

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthSession, SessionProvider};
use crate::models::UserId;

const PROBE_TIMEOUT_SECS: u64 = 3;

/// Host-provided network reachability signal.
pub trait Connectivity {
    fn is_online(&self) -> bool;
}

/// Reachability flag flipped by the host; clones share the flag.
#[derive(Debug, Clone)]
pub struct StaticConnectivity {
    online: Arc<AtomicBool>,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn online() -> Self {
        Self::new(true)
    }

    pub fn offline() -> Self {
        Self::new(false)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Connectivity for StaticConnectivity {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Whether `url` answers at all within a short timeout.
///
/// Any HTTP status counts as reachable.
pub async fn probe(url: &str) -> bool {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
        .build()
    {
        Ok(client) => client,
        Err(error) => {
            tracing::warn!("Failed to build probe HTTP client: {}", error);
            return false;
        }
    };

    match client.head(url).send().await {
        Ok(_) => true,
        Err(error) => {
            tracing::debug!("Probe of {url} failed: {}", error);
            false
        }
    }
}

/// Outcome of the precondition checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Online with a session for this user
    Ready { session: AuthSession, user: UserId },
    Offline,
    SignedOut,
}

/// Runs the connectivity and session checks for one cycle.
pub struct PreconditionGuard<'a, C: ?Sized, S> {
    connectivity: &'a C,
    sessions: &'a S,
}

impl<'a, C, S> PreconditionGuard<'a, C, S>
where
    C: Connectivity + ?Sized,
    S: SessionProvider,
{
    pub const fn new(connectivity: &'a C, sessions: &'a S) -> Self {
        Self {
            connectivity,
            sessions,
        }
    }

    /// Check reachability first, then the session.
    pub async fn check(&self) -> Readiness {
        if !self.connectivity.is_online() {
            return Readiness::Offline;
        }

        let Some(session) = self.sessions.current_session().await else {
            return Readiness::SignedOut;
        };
        match session.user_id() {
            Some(user) => Readiness::Ready { session, user },
            None => Readiness::SignedOut,
        }
    }
}
