//! Shared, lazily-built HTTP session with a concurrent-connection cap.

use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A ready-to-use client plus the slots that bound concurrent connections.
///
/// Cloning is cheap and shares the same pool and the same slots.
#[derive(Clone, Debug)]
pub struct Session {
    client: Client,
    slots: Arc<Semaphore>,
    capacity: usize,
    generation: u64,
}

impl Session {
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Waits for a free connection slot. The slot is released when the
    /// returned permit is dropped.
    pub async fn connection(&self) -> Result<OwnedSemaphorePermit> {
        self.slots
            .clone()
            .acquire_owned()
            .await
            .context("Connection limiter is closed")
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available_connections(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.slots.available_permits())
    }

    /// Which build of the manager's session this is, starting at 1.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Observable lifecycle of the managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Open,
    Closed,
}

enum Slot {
    Absent,
    Open(Session),
    Closed,
}

struct Inner {
    slot: Slot,
    builds: u64,
}

/// Owns the session and rebuilds it on demand.
///
/// The connection slots belong to the manager, not to one session: requests
/// still running on a closed session keep counting against the cap of the
/// session that replaces it.
pub struct SessionManager {
    timeout: Duration,
    max_connections: usize,
    user_agent: String,
    slots: Arc<Semaphore>,
    inner: Mutex<Inner>,
}

impl SessionManager {
    pub fn new(timeout: Duration, max_connections: usize) -> Self {
        Self {
            timeout,
            max_connections,
            user_agent: format!("resilient-llm/{}", env!("RESILIENT_LLM_VERSION")),
            slots: Arc::new(Semaphore::new(max_connections)),
            inner: Mutex::new(Inner {
                slot: Slot::Absent,
                builds: 0,
            }),
        }
    }

    /// Returns the open session, building a new one if there is none.
    ///
    /// The whole check-then-build runs under the lock, so parallel callers
    /// never build two sessions.
    pub fn acquire(&self) -> Result<Session> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if let Slot::Open(session) = &inner.slot {
            return Ok(session.clone());
        }

        let session = self.build(inner.builds + 1)?;
        inner.builds += 1;
        inner.slot = Slot::Open(session.clone());
        Ok(session)
    }

    /// Drops the current session, if any. Safe to call repeatedly.
    ///
    /// Requests already holding a clone finish on it; the pool is released
    /// once the last clone is gone.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if matches!(inner.slot, Slot::Open(_)) {
            inner.slot = Slot::Closed;
            debug!("Closed HTTP session");
        }
    }

    pub fn state(&self) -> SessionState {
        match &self.inner.lock().unwrap_or_else(|e| e.into_inner()).slot {
            Slot::Absent => SessionState::Absent,
            Slot::Open(_) => SessionState::Open,
            Slot::Closed => SessionState::Closed,
        }
    }

    fn build(&self, generation: u64) -> Result<Session> {
        debug!(
            "Creating HTTP session #{}: timeout={:?}, max_connections={}",
            generation, self.timeout, self.max_connections
        );

        let client = Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.max_connections)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Session {
            client,
            slots: self.slots.clone(),
            capacity: self.max_connections,
            generation,
        })
    }
}
