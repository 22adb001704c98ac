//! Process-wide registry for the single active background task.
//!
//! Scans, processor runs and pre-cache passes are mutually exclusive; each
//! registers here before starting. The slot records a heartbeat so a task
//! whose owner died can be evicted instead of blocking the service forever.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const DEFAULT_STALE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: Uuid,
    pub name: String,
    pub started_at: Instant,
    pub last_heartbeat: Instant,
}

struct Slot {
    current: Option<(TaskInfo, CancellationToken)>,
}

/// Registry with an atomic "current task" slot.
#[derive(Clone)]
pub struct TaskRegistry {
    slot: Arc<Mutex<Slot>>,
    stale_timeout: Duration,
}

/// Held by the running task; dropping it clears the slot.
pub struct TaskHandle {
    registry: TaskRegistry,
    id: Uuid,
    pub token: CancellationToken,
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}

/// Another task is already running.
#[derive(Debug, thiserror::Error)]
#[error("task already running: {name}")]
pub struct TaskBusy {
    pub name: String,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::with_stale_timeout(DEFAULT_STALE_TIMEOUT)
    }

    pub fn with_stale_timeout(stale_timeout: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot { current: None })),
            stale_timeout,
        }
    }

    /// Claim the task slot. Fails when a live task holds it; a stale task
    /// (no heartbeat within the timeout) is cancelled and evicted.
    pub fn register(&self, name: &str) -> Result<TaskHandle, TaskBusy> {
        let mut slot = self.slot.lock().expect("task registry lock");

        if let Some((info, token)) = &slot.current {
            if info.last_heartbeat.elapsed() < self.stale_timeout {
                return Err(TaskBusy {
                    name: info.name.clone(),
                });
            }
            tracing::warn!(task = %info.name, "Evicting stale task");
            token.cancel();
        }

        let info = TaskInfo {
            id: Uuid::new_v4(),
            name: name.to_string(),
            started_at: Instant::now(),
            last_heartbeat: Instant::now(),
        };
        let token = CancellationToken::new();
        let id = info.id;
        slot.current = Some((info, token.clone()));

        Ok(TaskHandle {
            registry: self.clone(),
            id,
            token,
        })
    }

    /// Refresh the heartbeat for a running task.
    pub fn heartbeat(&self, id: Uuid) {
        let mut slot = self.slot.lock().expect("task registry lock");
        if let Some((info, _)) = &mut slot.current {
            if info.id == id {
                info.last_heartbeat = Instant::now();
            }
        }
    }

    /// Cancel the current task, if any. Returns whether one was running.
    pub fn cancel_current(&self) -> bool {
        let slot = self.slot.lock().expect("task registry lock");
        match &slot.current {
            Some((info, token)) => {
                tracing::info!(task = %info.name, "Cancelling task");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Info about the current task, if any.
    pub fn current(&self) -> Option<TaskInfo> {
        let slot = self.slot.lock().expect("task registry lock");
        slot.current.as_ref().map(|(info, _)| info.clone())
    }

    fn clear(&self, id: Uuid) {
        let mut slot = self.slot.lock().expect("task registry lock");
        if let Some((info, _)) = &slot.current {
            if info.id == id {
                slot.current = None;
            }
        }
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskHandle {
    pub fn heartbeat(&self) {
        self.registry.heartbeat(self.id);
    }

    /// Keep the heartbeat fresh from a background task. The task exits on
    /// its own once this handle is dropped and the slot moves on.
    pub fn spawn_heartbeat(&self) {
        let registry = self.registry.clone();
        let id = self.id;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
            interval.tick().await;
            loop {
                interval.tick().await;
                if registry.current().map(|info| info.id) != Some(id) {
                    break;
                }
                registry.heartbeat(id);
            }
        });
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.registry.clear(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_task_at_a_time() {
        let registry = TaskRegistry::new();
        let handle = registry.register("scan").unwrap();

        let err = registry.register("process").unwrap_err();
        assert_eq!(err.name, "scan");

        drop(handle);
        assert!(registry.register("process").is_ok());
    }

    #[test]
    fn test_cancel_current_fires_token() {
        let registry = TaskRegistry::new();
        let handle = registry.register("scan").unwrap();
        assert!(!handle.token.is_cancelled());

        assert!(registry.cancel_current());
        assert!(handle.token.is_cancelled());
    }

    #[test]
    fn test_stale_task_is_evicted() {
        let registry = TaskRegistry::with_stale_timeout(Duration::from_millis(0));
        let first = registry.register("scan").unwrap();

        // Zero timeout: the first task is immediately stale.
        let second = registry.register("process").unwrap();
        assert!(first.token.is_cancelled());

        drop(second);
        assert!(registry.current().is_none());
    }

    #[test]
    fn test_cancel_with_no_task() {
        let registry = TaskRegistry::new();
        assert!(!registry.cancel_current());
    }
}
