use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

/// Orchestrator lifecycle.
///
/// `Uninitialized → Initializing → Ready → Running → EmergencyStopped → ShuttingDown → Terminated`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Lifecycle {
    #[default]
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    Running = 3,
    EmergencyStopped = 4,
    ShuttingDown = 5,
    Terminated = 6,
}

impl Lifecycle {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Lifecycle::Initializing,
            2 => Lifecycle::Ready,
            3 => Lifecycle::Running,
            4 => Lifecycle::EmergencyStopped,
            5 => Lifecycle::ShuttingDown,
            6 => Lifecycle::Terminated,
            _ => Lifecycle::Uninitialized,
        }
    }

    /// States in which `run_cycle()` is accepted (skipping counts as accepted).
    pub fn accepts_cycles(&self) -> bool {
        matches!(
            self,
            Lifecycle::Ready | Lifecycle::Running | Lifecycle::EmergencyStopped
        )
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::Initializing => "initializing",
            Lifecycle::Ready => "ready",
            Lifecycle::Running => "running",
            Lifecycle::EmergencyStopped => "emergency_stopped",
            Lifecycle::ShuttingDown => "shutting_down",
            Lifecycle::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Loop state. Owned and mutated only by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleState {
    pub lifecycle: Lifecycle,
    pub initialized: bool,
    pub running: bool,
    pub emergency_stop: bool,
    pub consecutive_error_count: u32,
}

#[derive(Default)]
struct Shared {
    lifecycle: AtomicU8,
    initialized: AtomicBool,
    running: AtomicBool,
    emergency_stop: AtomicBool,
    consecutive_errors: AtomicU32,
}

/// Read-only view of `CycleState` for other tasks (health, telemetry).
///
/// Cloning is cheap; only the orchestrator publishes into it.
#[derive(Clone, Default)]
pub struct StateHandle {
    inner: Arc<Shared>,
}

impl StateHandle {
    pub(crate) fn publish(&self, state: &CycleState) {
        let s = &self.inner;
        s.lifecycle.store(state.lifecycle as u8, Ordering::Release);
        s.initialized.store(state.initialized, Ordering::Release);
        s.running.store(state.running, Ordering::Release);
        s.emergency_stop.store(state.emergency_stop, Ordering::Release);
        s.consecutive_errors
            .store(state.consecutive_error_count, Ordering::Release);
    }

    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::from_u8(self.inner.lifecycle.load(Ordering::Acquire))
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_emergency_stopped(&self) -> bool {
        self.inner.emergency_stop.load(Ordering::Acquire)
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.inner.consecutive_errors.load(Ordering::Acquire)
    }

    /// Snapshot of every field. Fields are read individually, not atomically as a group.
    pub fn snapshot(&self) -> CycleState {
        CycleState {
            lifecycle: self.lifecycle(),
            initialized: self.is_initialized(),
            running: self.is_running(),
            emergency_stop: self.is_emergency_stopped(),
            consecutive_error_count: self.consecutive_errors(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_roundtrips_through_u8() {
        for state in [
            Lifecycle::Uninitialized,
            Lifecycle::Initializing,
            Lifecycle::Ready,
            Lifecycle::Running,
            Lifecycle::EmergencyStopped,
            Lifecycle::ShuttingDown,
            Lifecycle::Terminated,
        ] {
            assert_eq!(Lifecycle::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_handle_sees_published_state() {
        let handle = StateHandle::default();
        let reader = handle.clone();
        assert_eq!(reader.lifecycle(), Lifecycle::Uninitialized);

        let state = CycleState {
            lifecycle: Lifecycle::EmergencyStopped,
            initialized: true,
            running: true,
            emergency_stop: true,
            consecutive_error_count: 6,
        };
        handle.publish(&state);
        assert_eq!(reader.snapshot(), state);
    }

    #[test]
    fn test_accepts_cycles() {
        assert!(!Lifecycle::Uninitialized.accepts_cycles());
        assert!(!Lifecycle::Initializing.accepts_cycles());
        assert!(Lifecycle::Ready.accepts_cycles());
        assert!(Lifecycle::EmergencyStopped.accepts_cycles());
        assert!(!Lifecycle::Terminated.accepts_cycles());
    }
}
