//! Controller loop (component G): computes successive execution windows from the dynamic
//! runahead and the previous round's reported next-event time, and drives the
//! [`RoundScheduler`] to completion.

use sim_time::SimulationTime;

use crate::round::RoundScheduler;
use crate::runahead::Runahead;

/// A snapshot of the counters §7 calls "locally recovered" errors, taken after the run completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub events_dropped_after_end: u64,
    pub events_faulted: u64,
}

/// Drives a [`RoundScheduler`] through successive rounds until the simulation has no more
/// events to run, per §4.5's controller loop.
pub struct Controller {
    round: RoundScheduler,
    runahead: Runahead,
}

impl Controller {
    pub fn new(round: RoundScheduler, runahead: Runahead) -> Self {
        Self { round, runahead }
    }

    /// Run the simulation to completion: `start`, `boot_hosts`, then the window-advance loop,
    /// finishing with `finish`. Returns the accumulated host statistics.
    pub fn run(mut self) -> RunSummary {
        self.round.start();
        self.round.boot_hosts();

        let end_time = self.round.end_time();
        let min_latency = self.runahead.get();

        let mut w_start = SimulationTime::ZERO;
        let mut w_end = std::cmp::min(min_latency, end_time);

        loop {
            self.round.continue_round(w_start, w_end);
            let min_next = self.round.await_round();

            if min_next == SimulationTime::MAX || min_next >= end_time {
                break;
            }

            let min_latency = self.runahead.get();
            w_start = w_end;
            w_end = std::cmp::min(
                end_time,
                std::cmp::max(min_next, w_start.saturating_add(min_latency)),
            );
        }

        let summary = RunSummary {
            events_dropped_after_end: self.round.stats().events_dropped_after_end(),
            events_faulted: self.round.stats().events_faulted(),
        };
        self.round.finish();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Task};
    use crate::host::{Host, HostId};
    use crate::policy::{SchedulerPolicyKind, SchedulingPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn terminates_when_no_events_remain() {
        let host = Arc::new(Host::new(HostId::from_raw(0), "h"));
        let fired = Arc::new(AtomicUsize::new(0));
        let fired2 = Arc::clone(&fired);
        host.lock().push(Event::new(
            SimulationTime::from_millis(500),
            None,
            host.id(),
            Task::new(move |_| {
                fired2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ));

        let policy = SchedulingPolicy::new(
            SchedulerPolicyKind::Serial,
            vec![host],
            &[],
            None,
            false,
            SimulationTime::from_secs(1),
        )
        .unwrap();
        let round = RoundScheduler::new(policy, SimulationTime::from_secs(1));
        let runahead = Runahead::new(false, SimulationTime::from_millis(100), None);
        let controller = Controller::new(round, runahead);

        controller.run();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn terminates_on_empty_host_set_without_deadlock() {
        let policy = SchedulingPolicy::new(
            SchedulerPolicyKind::Serial,
            vec![],
            &[],
            None,
            false,
            SimulationTime::from_secs(1),
        )
        .unwrap();
        let round = RoundScheduler::new(policy, SimulationTime::from_secs(1));
        let runahead = Runahead::new(false, SimulationTime::from_millis(1), None);
        let controller = Controller::new(round, runahead);
        controller.run();
    }
}
