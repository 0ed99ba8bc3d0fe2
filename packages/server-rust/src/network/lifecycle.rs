//! Server health state and in-flight RPC call tracking.
//!
//! Health transitions are lock-free through `ArcSwap`; in-flight calls are
//! counted with RAII guards so a panicking handler still releases its slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

/// Starting -> Ready -> Draining -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Starting,
    Ready,
    /// Shutdown signalled; new RPC calls are refused.
    Draining,
    /// Every in-flight call finished after draining.
    Stopped,
}

impl HealthState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Shared by the HTTP handlers and [`NetworkModule`](super::NetworkModule).
#[derive(Debug)]
pub struct ServerLifecycle {
    state: ArcSwap<HealthState>,
    in_flight: Arc<AtomicU64>,
}

impl ServerLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(HealthState::Starting),
            in_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn mark_ready(&self) {
        self.state.store(Arc::new(HealthState::Ready));
    }

    /// Moves to `Draining`. RPC calls arriving afterwards are refused.
    pub fn begin_drain(&self) {
        self.state.store(Arc::new(HealthState::Draining));
    }

    #[must_use]
    pub fn state(&self) -> HealthState {
        **self.state.load()
    }

    /// Calls are refused only while draining or stopped; a router used
    /// without [`NetworkModule::serve`](super::NetworkModule::serve) stays in
    /// `Starting` and still dispatches.
    #[must_use]
    pub fn accepts_calls(&self) -> bool {
        matches!(self.state(), HealthState::Starting | HealthState::Ready)
    }

    /// Counts one call until the returned guard is dropped.
    #[must_use]
    pub fn track_call(&self) -> CallGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        CallGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn active_calls(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Waits up to `timeout` for in-flight calls to finish. On success the
    /// state becomes `Stopped`; on timeout it stays `Draining`.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.active_calls() == 0 {
                self.state.store(Arc::new(HealthState::Stopped));
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Default for ServerLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases one in-flight slot on drop.
#[derive(Debug)]
pub struct CallGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
