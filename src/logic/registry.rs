use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::cluster::{BackgroundProcess, ClusterGateway, ProcessExit};
use crate::error::Result;
use crate::model::{DeploymentKey, InstallState, ToolDefinition, User};

/// One install attempt and the background process driving it.
struct InstallHandle {
    id: Uuid,
    key: DeploymentKey,
    state: InstallState,
    process: Option<Box<dyn BackgroundProcess>>,
    started_at: Instant,
    finished_at: Option<Instant>,
}

impl InstallHandle {
    fn new(key: DeploymentKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            state: InstallState::NotStarted,
            process: None,
            started_at: Instant::now(),
            finished_at: None,
        }
    }

    fn launched(&mut self, process: Box<dyn BackgroundProcess>) {
        self.process = Some(process);
        self.state = InstallState::Deploying;
    }

    fn finish(&mut self, state: InstallState) -> InstallState {
        self.state = state;
        self.process = None;
        self.finished_at = Some(Instant::now());
        state
    }

    fn fail(&mut self, exit: ProcessExit) -> InstallState {
        log::error!(
            "Install {} of {} failed (exit code {:?}): {}",
            self.id,
            self.key,
            exit.code,
            exit.output
        );
        self.finish(InstallState::Failed)
    }

    /// Non-blocking. A dead process is never polled again.
    fn poll(&mut self) -> InstallState {
        if self.state.is_terminal() {
            return self.state;
        }
        let Some(process) = self.process.as_mut() else {
            return self.state;
        };
        match process.try_wait() {
            Ok(None) => InstallState::Deploying,
            Ok(Some(exit)) if exit.success => {
                log::info!(
                    "Install {} of {} completed after {:?}",
                    self.id,
                    self.key,
                    self.started_at.elapsed()
                );
                self.finish(InstallState::Complete)
            }
            Ok(Some(exit)) => self.fail(exit),
            Err(e) => self.fail(ProcessExit::failed(None, format!("unable to poll install: {}", e))),
        }
    }

    fn expired(&self, ttl: Duration) -> bool {
        self.state == InstallState::Failed
            && self.finished_at.map(|at| at.elapsed() > ttl).unwrap_or(false)
    }
}

/// Outcome of asking the registry to start an install.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallClaim {
    /// This call claimed the slot and launched the install.
    Started,
    /// An install for the same user and chart is already in flight.
    AlreadyRunning,
}

type SharedHandle = Arc<Mutex<InstallHandle>>;

/// Gives a claimed slot back unless the install was launched. Also runs when
/// the future driving `start` is dropped before the gateway returns.
struct LaunchGuard<'a> {
    registry: &'a InstallRegistry,
    key: &'a DeploymentKey,
    handle: &'a SharedHandle,
    launched: bool,
}

impl Drop for LaunchGuard<'_> {
    fn drop(&mut self) {
        if !self.launched {
            log::warn!("Install of {} was not launched, releasing its slot", self.key);
            self.registry.release(self.key, self.handle);
        }
    }
}

/// Process-wide registry of in-flight installs, keyed by (user, chart).
///
/// Lock order is registry map, then handle. Never take the map lock while a
/// handle lock is held.
pub struct InstallRegistry {
    entries: Mutex<HashMap<DeploymentKey, SharedHandle>>,
    /// How long a failed handle keeps reporting `Failed` before it is swept
    failed_ttl: Duration,
}

impl InstallRegistry {
    pub fn new(failed_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            failed_ttl,
        }
    }

    /// Claim the slot for `key`, or `None` if a live install holds it.
    /// A failed handle is replaced by the new attempt.
    fn claim(&self, key: &DeploymentKey) -> Option<SharedHandle> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(key) {
            if !existing.lock().state.is_terminal() {
                return None;
            }
        }
        let handle = Arc::new(Mutex::new(InstallHandle::new(key.clone())));
        entries.insert(key.clone(), Arc::clone(&handle));
        Some(handle)
    }

    /// Remove `handle` if it is still the one registered for `key`.
    fn release(&self, key: &DeploymentKey, handle: &SharedHandle) {
        let mut entries = self.entries.lock();
        if entries
            .get(key)
            .map(|current| Arc::ptr_eq(current, handle))
            .unwrap_or(false)
        {
            entries.remove(key);
        }
    }

    /// Launch an install unless one is already in flight for this user and chart.
    pub async fn start(
        &self,
        user: &User,
        tool: &ToolDefinition,
        gateway: &dyn ClusterGateway,
    ) -> Result<InstallClaim> {
        let key = DeploymentKey::new(user, &tool.chart_name);
        let Some(handle) = self.claim(&key) else {
            log::info!("Install of {} already in progress", key);
            return Ok(InstallClaim::AlreadyRunning);
        };

        let mut guard = LaunchGuard {
            registry: self,
            key: &key,
            handle: &handle,
            launched: false,
        };
        let process = gateway.install(user, tool).await?;
        handle.lock().launched(process);
        guard.launched = true;
        Ok(InstallClaim::Started)
    }

    /// Non-blocking status of the install for `key`.
    ///
    /// `None` means no handle governs the answer: nothing was started, or the
    /// install completed and its handle has been released.
    pub fn poll(&self, key: &DeploymentKey) -> Option<InstallState> {
        let handle = self.entries.lock().get(key).cloned()?;
        let state = handle.lock().poll();
        if state == InstallState::Complete {
            self.release(key, &handle);
            return None;
        }
        Some(state)
    }

    /// Current state without polling the process.
    pub fn state(&self, key: &DeploymentKey) -> Option<InstallState> {
        let handle = self.entries.lock().get(key).cloned()?;
        let state = handle.lock().state;
        Some(state)
    }

    /// Drop a handle that reached a terminal state. In-flight installs are kept.
    pub fn discard(&self, key: &DeploymentKey) -> bool {
        let mut entries = self.entries.lock();
        let terminal = entries
            .get(key)
            .map(|handle| handle.lock().state.is_terminal())
            .unwrap_or(false);
        if terminal {
            entries.remove(key);
        }
        terminal
    }

    /// Drop failed handles older than the TTL
    pub fn clear_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        let ttl = self.failed_ttl;
        entries.retain(|_, handle| !handle.lock().expired(ttl));
        let removed = before - entries.len();
        if removed > 0 {
            log::debug!("Discarded {} expired install handles", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for InstallRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}
