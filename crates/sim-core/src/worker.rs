//! Per-thread execution context (§10.1): exposes the simulated time a worker thread is currently
//! running a host at, so the logger can stamp log records with simulation time without threading
//! a parameter through every `log::info!` call site. Grounded on the teacher's `Worker`
//! thread-local (`main/core/worker.rs`), reduced to the one piece of state this crate's logger
//! actually needs; the teacher's `Worker` additionally tracks the active process/thread and a
//! set of debug object counters, both tied to the syscall-emulation machinery this crate treats
//! as an out-of-scope collaborator (§1).

use std::cell::Cell;

use sim_time::EmulatedTime;

std::thread_local! {
    static CURRENT_TIME: Cell<Option<EmulatedTime>> = const { Cell::new(None) };
}

/// A scope guard that restores the previous thread-local clock value on drop, so nested
/// `execute` calls (a host scheduling an event back onto itself, or onto another host on the
/// same thread during a `serial` round) unwind cleanly.
pub(crate) struct ClockGuard(Option<EmulatedTime>);

impl Drop for ClockGuard {
    fn drop(&mut self) {
        CURRENT_TIME.with(|cell| cell.set(self.0));
    }
}

/// Record that the calling thread is now running a host at `time`, returning a guard that
/// restores the previous value when dropped. Called once per [`crate::host::Host::execute`].
pub(crate) fn enter(time: EmulatedTime) -> ClockGuard {
    let previous = CURRENT_TIME.with(|cell| cell.replace(Some(time)));
    ClockGuard(previous)
}

/// The simulated time of the host currently executing on this thread, or `None` if this thread
/// isn't inside a `host.execute` call (e.g. the controller thread before the first round, or any
/// thread outside the worker pool). Used by [`crate::logging::SimLogger`] to stamp log records.
pub fn current_time() -> Option<EmulatedTime> {
    CURRENT_TIME.with(|cell| cell.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_time::SimulationTime;

    #[test]
    fn absent_outside_a_host_execution() {
        assert_eq!(current_time(), None);
    }

    #[test]
    fn present_while_entered_and_restored_after_drop() {
        assert_eq!(current_time(), None);
        let t = EmulatedTime::from_abs_simtime(SimulationTime::from_secs(5));
        {
            let _guard = enter(t);
            assert_eq!(current_time(), Some(t));
        }
        assert_eq!(current_time(), None);
    }

    #[test]
    fn nested_enter_restores_outer_value() {
        let outer = EmulatedTime::from_abs_simtime(SimulationTime::from_secs(1));
        let inner = EmulatedTime::from_abs_simtime(SimulationTime::from_secs(2));
        let _outer_guard = enter(outer);
        {
            let _inner_guard = enter(inner);
            assert_eq!(current_time(), Some(inner));
        }
        assert_eq!(current_time(), Some(outer));
    }
}
