//! A thread-per-host host scheduler.
//!
//! This is the simpler, legacy sibling of [`crate::thread_per_core::ThreadPerCoreSched`]: instead
//! of pinning a small number of long-lived worker threads and having them steal hosts from each
//! other, each round a fresh batch of [`std::thread::scope`]d threads is spawned, one per logical
//! slot. Hosts are bucketed into slots round-robin once, at construction, and that slot
//! assignment is fixed for the scheduler's lifetime — every round hands each slot's bucket back
//! to the same slot it came from, never redistributing hosts across slots. This stability
//! matters beyond load balance: callers (e.g. a scheduling policy) compute a host's worker
//! assignment once from its original index and rely on it staying accurate for the life of the
//! run. There is no stealing, so an unbalanced host assignment can leave some threads idle while
//! others are still working. Prefer [`crate::thread_per_core::ThreadPerCoreSched`] unless you
//! have a specific reason not to.

#![forbid(unsafe_code)]

use std::fmt::Debug;

use crate::CORE_AFFINITY;

pub trait Host: Debug + Send {}
impl<T> Host for T where T: Debug + Send {}

/// A host scheduler.
pub struct ThreadPerHostSched<HostType: Host> {
    /// The CPU that each logical slot should be pinned to, if any. The number of slots is
    /// `cpu_ids.len()`, and is the upper bound on how many hosts run concurrently.
    cpu_ids: Vec<Option<u32>>,
    /// Hosts bucketed by slot, assigned once at construction and never reshuffled across
    /// rounds: slot `i` always holds the same hosts it was given at `new`, so a host's
    /// physical slot never drifts away from the `i % num_threads` assignment the caller
    /// (e.g. a scheduling policy's `assigned_worker()`) computed from its original index.
    slots: Vec<Vec<HostType>>,
}

impl<HostType: Host> ThreadPerHostSched<HostType> {
    /// A new host scheduler with `cpu_ids.len()` logical slots, each pinned to the provided OS
    /// processor (if any). Hosts are assigned to slots round-robin once here, and that
    /// assignment is fixed for the scheduler's lifetime.
    pub fn new<T>(cpu_ids: &[Option<u32>], hosts: T) -> Self
    where
        T: IntoIterator<Item = HostType>,
    {
        let num_slots = cpu_ids.len().max(1);
        let mut slots: Vec<Vec<HostType>> = (0..num_slots).map(|_| Vec::new()).collect();
        for (i, host) in hosts.into_iter().enumerate() {
            slots[i % num_slots].push(host);
        }

        Self {
            cpu_ids: cpu_ids.to_vec(),
            slots,
        }
    }

    /// See [`crate::Scheduler::parallelism`].
    pub fn parallelism(&self) -> usize {
        self.cpu_ids.len().max(1)
    }

    /// See [`crate::Scheduler::scope`].
    pub fn scope<'scope>(
        &'scope mut self,
        f: impl for<'a> FnOnce(SchedulerScope<'a, 'scope, HostType>) + 'scope,
    ) {
        let sched_scope = SchedulerScope {
            cpu_ids: &self.cpu_ids,
            slots: &mut self.slots,
        };

        f(sched_scope);
    }

    /// See [`crate::Scheduler::join`].
    pub fn join(self) {
        // nothing to join: no persistent threads are kept between rounds
    }
}

fn pin_to_cpu(cpu_id: Option<u32>) {
    if let Some(cpu_id) = cpu_id {
        let mut cpus = nix::sched::CpuSet::new();
        cpus.set(cpu_id as usize).unwrap();
        nix::sched::sched_setaffinity(nix::unistd::Pid::from_raw(0), &cpus).unwrap();
        CORE_AFFINITY.with(|x| x.set(Some(cpu_id)));
    }
}

/// A scope for a single round run by the thread-per-host scheduler.
pub struct SchedulerScope<'a, 'scope, HostType: Host> {
    cpu_ids: &'a [Option<u32>],
    slots: &'scope mut Vec<Vec<HostType>>,
}

impl<'a, 'scope, HostType: Host> SchedulerScope<'a, 'scope, HostType> {
    /// See [`crate::SchedulerScope::run`].
    pub fn run(self, f: impl Fn(usize) + Sync + Send + 'scope) {
        std::thread::scope(|s| {
            for (idx, cpu_id) in self.cpu_ids.iter().copied().enumerate() {
                let f = &f;
                s.spawn(move || {
                    pin_to_cpu(cpu_id);
                    f(idx);
                });
            }
        });
    }

    /// See [`crate::SchedulerScope::run_with_hosts`].
    pub fn run_with_hosts(self, f: impl Fn(usize, &mut HostIter<HostType>) + Send + Sync + 'scope) {
        let cpu_ids = self.cpu_ids;
        let f = &f;
        let processed = std::thread::scope(|s| {
            let handles: Vec<_> = std::mem::take(self.slots)
                .into_iter()
                .enumerate()
                .map(|(idx, bucket)| {
                    let cpu_id = cpu_ids.get(idx).copied().flatten();
                    s.spawn(move || {
                        pin_to_cpu(cpu_id);
                        let mut iter = HostIter { hosts: bucket };
                        f(idx, &mut iter);
                        iter.hosts
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("A host thread panicked"))
                .collect::<Vec<_>>()
        });

        // write each slot's hosts back into its own slot: a host's physical slot never moves.
        *self.slots = processed;
    }

    /// See [`crate::SchedulerScope::run_with_data`].
    pub fn run_with_data<T>(
        self,
        data: &'scope [T],
        f: impl Fn(usize, &mut HostIter<HostType>, &T) + Send + Sync + 'scope,
    ) where
        T: Sync,
    {
        let cpu_ids = self.cpu_ids;
        let f = &f;
        let processed = std::thread::scope(|s| {
            let handles: Vec<_> = std::mem::take(self.slots)
                .into_iter()
                .enumerate()
                .map(|(idx, bucket)| {
                    let cpu_id = cpu_ids.get(idx).copied().flatten();
                    let elem = &data[idx.min(data.len() - 1)];
                    s.spawn(move || {
                        pin_to_cpu(cpu_id);
                        let mut iter = HostIter { hosts: bucket };
                        f(idx, &mut iter, elem);
                        iter.hosts
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("A host thread panicked"))
                .collect::<Vec<_>>()
        });

        // write each slot's hosts back into its own slot: a host's physical slot never moves.
        *self.slots = processed;
    }
}

/// Supports iterating over all hosts assigned to this slot for the current round.
pub struct HostIter<HostType: Host> {
    hosts: Vec<HostType>,
}

impl<HostType: Host> HostIter<HostType> {
    /// See [`crate::HostIter::for_each`].
    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(HostType) -> HostType,
    {
        let hosts = std::mem::take(&mut self.hosts);
        self.hosts = hosts.into_iter().map(&mut f).collect();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[derive(Debug)]
    struct TestHost {}

    #[test]
    fn test_parallelism() {
        let hosts = [(); 5].map(|_| TestHost {});
        let sched: ThreadPerHostSched<TestHost> = ThreadPerHostSched::new(&[None, None], hosts);

        assert_eq!(sched.parallelism(), 2);

        sched.join();
    }

    #[test]
    fn test_no_join() {
        let hosts = [(); 5].map(|_| TestHost {});
        let _sched: ThreadPerHostSched<TestHost> = ThreadPerHostSched::new(&[None, None], hosts);
    }

    #[test]
    #[should_panic]
    fn test_panic() {
        let hosts = [(); 5].map(|_| TestHost {});
        let mut sched: ThreadPerHostSched<TestHost> = ThreadPerHostSched::new(&[None, None], hosts);

        sched.scope(|s| {
            s.run(|x| {
                if x == 1 {
                    panic!();
                }
            });
        });
    }

    #[test]
    fn test_run() {
        let hosts = [(); 5].map(|_| TestHost {});
        let mut sched: ThreadPerHostSched<TestHost> = ThreadPerHostSched::new(&[None, None], hosts);

        let counter = AtomicU32::new(0);

        for _ in 0..3 {
            sched.scope(|s| {
                s.run(|_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        assert_eq!(counter.load(Ordering::SeqCst), 2 * 3);
    }

    #[test]
    fn test_run_with_hosts() {
        let hosts = [(); 5].map(|_| TestHost {});
        let mut sched: ThreadPerHostSched<TestHost> = ThreadPerHostSched::new(&[None, None], hosts);

        let counter = AtomicU32::new(0);

        for _ in 0..3 {
            sched.scope(|s| {
                s.run_with_hosts(|_, hosts| {
                    hosts.for_each(|host| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        host
                    });
                });
            });
        }

        assert_eq!(counter.load(Ordering::SeqCst), 5 * 3);
    }

    #[test]
    fn host_slot_assignment_is_stable_across_rounds() {
        #[derive(Debug)]
        struct IdHost(usize);

        let hosts = (0..6).map(IdHost).collect::<Vec<_>>();
        let mut sched: ThreadPerHostSched<IdHost> = ThreadPerHostSched::new(&[None, None], hosts);

        let slot_of_host_0 = std::sync::Mutex::new(Vec::new());
        for _ in 0..3 {
            sched.scope(|s| {
                s.run_with_hosts(|idx, hosts| {
                    hosts.for_each(|host| {
                        if host.0 == 0 {
                            slot_of_host_0.lock().unwrap().push(idx);
                        }
                        host
                    });
                });
            });
        }

        // host 0 must land in the same slot every round, never migrating to a peer's slot.
        let slot_of_host_0 = slot_of_host_0.into_inner().unwrap();
        assert_eq!(slot_of_host_0, vec![slot_of_host_0[0]; 3]);
    }

    #[test]
    fn test_run_with_data() {
        let hosts = [(); 5].map(|_| TestHost {});
        let mut sched: ThreadPerHostSched<TestHost> = ThreadPerHostSched::new(&[None, None], hosts);

        let data = vec![0u32; sched.parallelism()];
        let data: Vec<_> = data.into_iter().map(std::sync::Mutex::new).collect();

        for _ in 0..3 {
            sched.scope(|s| {
                s.run_with_data(&data, |_, hosts, elem| {
                    let mut elem = elem.lock().unwrap();
                    hosts.for_each(|host| {
                        *elem += 1;
                        host
                    });
                });
            });
        }

        let sum: u32 = data.into_iter().map(|x| x.into_inner().unwrap()).sum();
        assert_eq!(sum, 5 * 3);
    }
}
