//! Scheduling policy (component C): assigns hosts to workers, routes pushed events to the right
//! queue, and enforces the barrier-clamping rule of §4.1.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sim_time::{EmulatedTime, SimulationTime};

use crate::event::{Event, Task};
use crate::host::{Host, HostId};
use crate::stats::HostStats;

/// The scheduler-policy kinds recognized by the engine (§6).
///
/// `serial`, `host`, and `steal` are fully implemented, each backed by a distinct execution
/// engine. `thread-single`, `thread-per-thread`, and `thread-per-host` are the legacy
/// per-pair-queue variants the specification says were "preserved for comparison" and may be
/// stubs (§4.2, §9 open questions): this crate implements them as aliases of `host` routing with
/// their own recorded tag, since they differ from `host` only in lock-contention profile, not in
/// observable event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulerPolicyKind {
    Serial,
    Host,
    Steal,
    ThreadSingle,
    ThreadPerThread,
    ThreadPerHost,
}

impl SchedulerPolicyKind {
    fn uses_work_stealing(self) -> bool {
        matches!(self, Self::Steal)
    }
}

/// The shared routing table every [`Host`] holds a weak back-reference to, so that a running
/// event's task can call [`Host::schedule`] to push further events (§6, "`scheduler.push`") from
/// inside `host.execute` without needing a handle to the engine that is driving the round.
///
/// Owns the barrier-clamping rule of §4.1 and the end-time discard rule of §4.1/§7; these two
/// rules are the entire job of the "scheduling policy" as the specification describes it. Host
/// placement and round execution (the rest of what this module does) are a separate concern,
/// handled by [`SchedulingPolicy`] itself.
pub(crate) struct Router {
    hosts: Vec<Arc<Host>>,
    round_end: AtomicU64,
    global_end_time: SimulationTime,
    stats: HostStats,
}

impl Router {
    fn new(hosts: Vec<Arc<Host>>, global_end_time: SimulationTime) -> Arc<Self> {
        let router = Arc::new(Self {
            hosts,
            round_end: AtomicU64::new(0),
            global_end_time,
            stats: HostStats::new(),
        });
        for host in &router.hosts {
            host.set_router(Arc::downgrade(&router));
        }
        router
    }

    fn set_round_end(&self, round_end: SimulationTime) {
        self.round_end.store(round_end.as_nanos() as u64, Ordering::Relaxed);
    }

    /// `scheduler.push(event, sender?, receiver)` (§6), implementing the barrier-clamping rule
    /// of §4.1. Returns `false` ("discarded") if `time >= global_end_time`.
    pub(crate) fn push(
        &self,
        sender: Option<HostId>,
        receiver: HostId,
        time: SimulationTime,
        task: Task,
    ) -> bool {
        if time >= self.global_end_time {
            self.stats.record_dropped_after_end();
            return false;
        }

        let receiver_host = &self.hosts[receiver.as_raw() as usize];
        let sequence = match sender {
            Some(sender_id) => self.hosts[sender_id.as_raw() as usize].next_sequence(),
            // An externally-injected event (e.g. the boot task, or a packet arriving from a
            // collaborator outside the core) has no sender host to draw a sequence from; we fall
            // back to the receiver's own counter so the sequence is still host-deterministic.
            None => receiver_host.next_sequence(),
        };

        let mut event = Event::new(time, sender, receiver, task);
        event.set_sequence(sequence);

        let same_worker = match sender {
            Some(sender_id) => {
                self.hosts[sender_id.as_raw() as usize].assigned_worker()
                    == receiver_host.assigned_worker()
            }
            None => true,
        };

        let round_end = SimulationTime::from_nanos(self.round_end.load(Ordering::Relaxed));
        if !same_worker && event.time() < round_end {
            event.clamp_time_to(round_end);
        }

        receiver_host.lock().push(event);
        true
    }
}

enum Engine {
    /// `n_workers == 0`: the caller is the sole worker, no LP pool is allocated (§8 boundary
    /// behaviors).
    Serial,
    Parallel(sim_scheduler::Scheduler<Arc<Host>>),
}

/// Assigns hosts to workers and drives one round's worth of host execution.
///
/// Combines components C (policy), D (logical processor pool) and E (worker pool) into one
/// type: the LP-pool/work-stealing mechanics already live in `sim_scheduler`, so this type's own
/// job is host placement and reporting the round's minimum next-event time. Routing (the other
/// half of what the specification calls the "scheduling policy") lives in [`Router`], reachable
/// from any host via [`Host::schedule`].
pub struct SchedulingPolicy {
    kind: SchedulerPolicyKind,
    router: Arc<Router>,
    engine: Engine,
}

impl SchedulingPolicy {
    /// Build a policy over `hosts` (already shuffled by the caller for deterministic host->worker
    /// assignment, per §3/§9) using `cpu_ids.len()` workers. `cpu_ids` is ignored for `serial`,
    /// and an empty `cpu_ids` (`n_workers == 0`) always runs serially on the calling thread no
    /// matter what `kind` says, per §5/§8: there is no LP pool to allocate.
    ///
    /// Fatal per §7: a `steal` policy with more workers than `max_concurrency` is refused here,
    /// before any thread is spawned.
    pub fn new(
        kind: SchedulerPolicyKind,
        hosts: Vec<Arc<Host>>,
        cpu_ids: &[Option<u32>],
        max_concurrency: Option<u32>,
        yield_spin: bool,
        global_end_time: SimulationTime,
    ) -> anyhow::Result<Self> {
        if kind.uses_work_stealing() {
            if let Some(max_concurrency) = max_concurrency {
                if cpu_ids.len() as u32 > max_concurrency {
                    anyhow::bail!(
                        "policy 'steal' requires n_workers ({}) <= max_concurrency ({})",
                        cpu_ids.len(),
                        max_concurrency
                    );
                }
            }
        }

        // `n_workers == 0` (no cpu_ids / LP slots given) always runs serially on the calling
        // thread, regardless of the configured policy tag (§5, §8): a `host`/`steal` policy with
        // no worker slots to assign has nothing to parallelize over, so it collapses to `serial`
        // rather than spinning up a single-slot worker pool.
        let runs_serially = matches!(kind, SchedulerPolicyKind::Serial) || cpu_ids.is_empty();

        if runs_serially {
            for host in &hosts {
                host.assign_worker(0);
            }
        } else {
            let num_threads = cpu_ids.len();
            for (i, host) in hosts.iter().enumerate() {
                host.assign_worker(i % num_threads);
            }
        }

        let router = Router::new(hosts.clone(), global_end_time);

        let engine = if runs_serially {
            Engine::Serial
        } else if kind.uses_work_stealing() {
            Engine::Parallel(sim_scheduler::Scheduler::ThreadPerCore(
                sim_scheduler::thread_per_core::ThreadPerCoreSched::new(
                    cpu_ids,
                    hosts.into_iter(),
                    yield_spin,
                ),
            ))
        } else {
            Engine::Parallel(sim_scheduler::Scheduler::ThreadPerHost(
                sim_scheduler::thread_per_host::ThreadPerHostSched::new(cpu_ids, hosts),
            ))
        };

        Ok(Self { kind, router, engine })
    }

    pub fn kind(&self) -> SchedulerPolicyKind {
        self.kind
    }

    pub fn hosts(&self) -> &[Arc<Host>] {
        &self.router.hosts
    }

    pub fn stats(&self) -> &HostStats {
        &self.router.stats
    }

    pub fn parallelism(&self) -> usize {
        match &self.engine {
            Engine::Serial => 1,
            Engine::Parallel(s) => s.parallelism(),
        }
    }

    /// Inject an externally-sourced event (e.g. the simulation's first events, or a packet
    /// arrival from an out-of-scope collaborator) with no sender host.
    pub fn push_external(&self, time: SimulationTime, receiver: HostId, task: Task) -> bool {
        self.router.push(None, receiver, time, task)
    }

    /// Run every host's one-time boot task, in host-id order (deterministic regardless of
    /// worker assignment), per §6 "`host.boot()`: one-time startup, during first round".
    pub fn boot_hosts(&self) {
        for host in &self.router.hosts {
            host.boot();
        }
    }

    /// Run one round `[.., round_end)`: every worker drains its assigned hosts up to the barrier
    /// `round_end`, reporting the smallest next-event time seen across all hosts. Returns
    /// `SimulationTime::MAX` if no host has a pending event (§4.5 controller loop termination
    /// check).
    pub fn run_round(&mut self, round_end: SimulationTime) -> SimulationTime {
        self.router.set_round_end(round_end);
        let barrier = EmulatedTime::from_abs_simtime(round_end);

        match &mut self.engine {
            Engine::Serial => {
                let mut min_next = SimulationTime::MAX;
                for host in &self.router.hosts {
                    host.execute(barrier);
                    if let Some(t) = host.next_event_time() {
                        min_next = std::cmp::min(min_next, t.to_abs_simtime());
                    }
                }
                min_next
            }
            Engine::Parallel(scheduler) => {
                let min_next_nanos = AtomicU64::new(SimulationTime::MAX.as_nanos() as u64);
                scheduler.scope(|s| {
                    s.run_with_hosts(|_thread_idx, hosts| {
                        hosts.for_each(|host| {
                            host.execute(barrier);
                            if let Some(t) = host.next_event_time() {
                                min_next_nanos
                                    .fetch_min(t.to_abs_simtime().as_nanos() as u64, Ordering::SeqCst);
                            }
                            host
                        });
                    });
                });
                SimulationTime::from_nanos(min_next_nanos.load(Ordering::SeqCst))
            }
        }
    }

    pub fn join(self) {
        if let Engine::Parallel(scheduler) = self.engine {
            scheduler.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn make_hosts(n: usize) -> Vec<Arc<Host>> {
        (0..n)
            .map(|i| Arc::new(Host::new(HostId::from_raw(i as u32), format!("host{i}"))))
            .collect()
    }

    #[test]
    fn serial_policy_assigns_every_host_to_worker_zero() {
        let hosts = make_hosts(3);
        let policy = SchedulingPolicy::new(
            SchedulerPolicyKind::Serial,
            hosts,
            &[],
            None,
            false,
            SimulationTime::from_secs(1),
        )
        .unwrap();
        assert_eq!(policy.parallelism(), 1);
        for host in policy.hosts() {
            assert_eq!(host.assigned_worker(), Some(0));
        }
    }

    #[test]
    fn host_policy_with_zero_workers_collapses_to_serial() {
        // n_workers == 0 (empty cpu_ids) must run serially regardless of the configured policy
        // tag (§5, §8): no LP pool, no worker thread, every host assigned to worker 0.
        let hosts = make_hosts(3);
        let policy = SchedulingPolicy::new(
            SchedulerPolicyKind::Host,
            hosts,
            &[],
            None,
            false,
            SimulationTime::from_secs(1),
        )
        .unwrap();
        assert_eq!(policy.parallelism(), 1);
        for host in policy.hosts() {
            assert_eq!(host.assigned_worker(), Some(0));
        }
        policy.join();
    }

    #[test]
    fn host_policy_round_robins_across_workers() {
        let hosts = make_hosts(4);
        let policy = SchedulingPolicy::new(
            SchedulerPolicyKind::Host,
            hosts,
            &[None, None],
            None,
            false,
            SimulationTime::from_secs(1),
        )
        .unwrap();
        let assigned: Vec<_> = policy.hosts().iter().map(|h| h.assigned_worker()).collect();
        assert_eq!(assigned, vec![Some(0), Some(1), Some(0), Some(1)]);
        policy.join();
    }

    #[test]
    fn steal_policy_rejects_too_many_workers() {
        let hosts = make_hosts(2);
        let err = SchedulingPolicy::new(
            SchedulerPolicyKind::Steal,
            hosts,
            &[None, None, None],
            Some(1),
            false,
            SimulationTime::from_secs(1),
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn push_clamps_cross_worker_events_to_round_end() {
        let hosts = make_hosts(2);
        let (h0, h1) = (hosts[0].clone(), hosts[1].clone());
        let mut policy = SchedulingPolicy::new(
            SchedulerPolicyKind::Host,
            hosts,
            &[None, None],
            None,
            false,
            SimulationTime::from_secs(1),
        )
        .unwrap();
        assert_ne!(h0.assigned_worker(), h1.assigned_worker());

        // give h0's worker a round_end of 100ms, then have h0 schedule a cross-worker event at
        // 50ms: it must be clamped up to round_end.
        policy.run_round(SimulationTime::from_millis(100));
        let accepted = h0.schedule(SimulationTime::from_millis(50), h1.id(), Task::new(|_| Ok(())));
        assert!(accepted);

        let queued_time = h1.lock().next_event_time().unwrap();
        assert_eq!(queued_time, SimulationTime::from_millis(100));
        policy.join();
    }

    #[test]
    fn push_does_not_clamp_same_worker_events() {
        let hosts = make_hosts(2);
        let (h0, h1) = (hosts[0].clone(), hosts[1].clone());
        let mut policy = SchedulingPolicy::new(
            SchedulerPolicyKind::Serial,
            hosts,
            &[],
            None,
            false,
            SimulationTime::from_secs(1),
        )
        .unwrap();
        policy.run_round(SimulationTime::from_millis(100));

        h0.schedule(SimulationTime::from_millis(50), h1.id(), Task::new(|_| Ok(())));

        let queued_time = h1.lock().next_event_time().unwrap();
        assert_eq!(queued_time, SimulationTime::from_millis(50));
    }

    #[test]
    fn push_discards_events_at_or_after_global_end_time() {
        let hosts = make_hosts(1);
        let h0 = hosts[0].clone();
        let policy = SchedulingPolicy::new(
            SchedulerPolicyKind::Serial,
            hosts,
            &[],
            None,
            false,
            SimulationTime::from_secs(1),
        )
        .unwrap();

        let accepted = policy.push_external(
            SimulationTime::from_secs(1),
            h0.id(),
            Task::new(|_| Ok(())),
        );
        assert!(!accepted);
        assert_eq!(policy.stats().events_dropped_after_end(), 1);
    }

    #[test]
    fn run_round_reports_min_next_event_time_and_max_when_idle() {
        let hosts = make_hosts(2);
        let order = Arc::new(Mutex::new(Vec::new()));
        for (i, host) in hosts.iter().enumerate() {
            let order = Arc::clone(&order);
            host.lock().push(Event::new(
                SimulationTime::from_millis(10 + i as u64),
                None,
                host.id(),
                Task::new(move |_| {
                    order.lock().unwrap().push(i);
                    Ok(())
                }),
            ));
        }
        let mut policy = SchedulingPolicy::new(
            SchedulerPolicyKind::Serial,
            hosts,
            &[],
            None,
            false,
            SimulationTime::from_secs(1),
        )
        .unwrap();

        let min_next = policy.run_round(SimulationTime::from_millis(100));
        assert_eq!(min_next, SimulationTime::MAX);
        assert_eq!(order.lock().unwrap().len(), 2);
    }
}
