//! The host facade (component H): queue B, a recursive lock, a deterministic per-host counter,
//! and the `execute` / `next_event_time` entry points the core calls into.

use std::cell::UnsafeCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, Weak};

use once_cell::sync::OnceCell;
use sim_time::{AtomicEmulatedTime, EmulatedTime, SimulationTime};

use crate::event::Task;
use crate::host_queue::HostQueue;
use crate::policy::Router;
use crate::stats::HostStats;

/// A stable identifier derived from a host's name at registration time (§3, "Host").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostId(u32);

impl HostId {
    /// Build a `HostId` directly from a raw index. Exposed for tests and for embedders that
    /// already maintain their own dense host numbering; [`HostRegistry::add_host`] is the
    /// normal way to obtain one.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

fn current_thread_token() -> u64 {
    use std::thread_local;
    thread_local! {
        static TOKEN: u64 = {
            static NEXT: AtomicU64 = AtomicU64::new(1);
            NEXT.fetch_add(1, Ordering::Relaxed)
        };
    }
    TOKEN.with(|t| *t)
}

/// A mutex that the thread already holding it may lock again without deadlocking.
///
/// The specification calls the host lock "reentrant safe" (§5, §6) — the teacher achieves this
/// with a platform recursive mutex behind its C host object. There's no such primitive in the
/// standard library, so this is a small hand-rolled one: the outer acquisition takes the real
/// [`Mutex`], and re-entrant acquisitions from the same thread are recognized by a thread-local
/// token and granted without taking the lock again.
struct ReentrantLock<T> {
    data: UnsafeCell<T>,
    raw: Mutex<()>,
    owner: AtomicU64,
    depth: AtomicU32,
}

// SAFETY: access to `data` is only ever granted through a `ReentrantGuard`, and a guard is only
// ever handed out while `owner` identifies the calling thread and either this thread holds `raw`
// (depth transitioning 0 -> 1) or already held it (depth > 0, already excluding all other
// threads). No two threads can ever observe `owner == their own token` at the same time.
unsafe impl<T: Send> Send for ReentrantLock<T> {}
unsafe impl<T: Send> Sync for ReentrantLock<T> {}

impl<T> ReentrantLock<T> {
    fn new(value: T) -> Self {
        Self {
            data: UnsafeCell::new(value),
            raw: Mutex::new(()),
            owner: AtomicU64::new(0),
            depth: AtomicU32::new(0),
        }
    }

    fn lock(&self) -> ReentrantGuard<'_, T> {
        let token = current_thread_token();
        if self.owner.load(Ordering::Acquire) == token {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return ReentrantGuard {
                lock: self,
                raw_guard: None,
            };
        }

        let guard = self.raw.lock().unwrap();
        self.owner.store(token, Ordering::Release);
        self.depth.store(1, Ordering::Relaxed);
        ReentrantGuard {
            lock: self,
            raw_guard: Some(guard),
        }
    }
}

struct ReentrantGuard<'a, T> {
    lock: &'a ReentrantLock<T>,
    // `Some` only for the outermost acquisition on this thread; dropping it releases `raw`.
    raw_guard: Option<std::sync::MutexGuard<'a, ()>>,
}

impl<T> std::ops::Deref for ReentrantGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: see the `unsafe impl Send/Sync` comment above.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> std::ops::DerefMut for ReentrantGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see the `unsafe impl Send/Sync` comment above.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for ReentrantGuard<'_, T> {
    fn drop(&mut self) {
        if self.lock.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.lock.owner.store(0, Ordering::Release);
        }
    }
}

/// One virtual host: owns exactly one [`HostQueue`], a recursive lock, a monotonically
/// increasing per-host sequence counter, a back-pointer to its assigned worker (set once,
/// immutable thereafter), and the [`HostStats`] counters for §7's locally-recovered errors.
pub struct Host {
    id: HostId,
    name: String,
    queue: ReentrantLock<HostQueue>,
    sequence_counter: AtomicU64,
    assigned_worker: OnceCell<usize>,
    exiting: AtomicBool,
    current_time: AtomicEmulatedTime,
    boot_task: Mutex<Option<Task>>,
    booted: AtomicBool,
    stats: HostStats,
    router: OnceCell<Weak<Router>>,
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("exiting", &self.is_exiting())
            .finish()
    }
}

impl Host {
    pub fn new(id: HostId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            queue: ReentrantLock::new(HostQueue::new()),
            sequence_counter: AtomicU64::new(0),
            assigned_worker: OnceCell::new(),
            exiting: AtomicBool::new(false),
            current_time: AtomicEmulatedTime::new(EmulatedTime::SIMULATION_START),
            boot_task: Mutex::new(None),
            booted: AtomicBool::new(false),
            stats: HostStats::new(),
            router: OnceCell::new(),
        }
    }

    /// Attach this host to the router that will carry events it schedules onto other hosts.
    /// Called once by [`crate::policy::SchedulingPolicy::new`]; a `Weak` reference avoids a
    /// reference cycle, since the router itself owns an `Arc` to every host.
    pub(crate) fn set_router(&self, router: Weak<Router>) {
        self.router
            .set(router)
            .expect("host attached to a router more than once");
    }

    /// Schedule `task` to run on `receiver` at `time`, as `self` (§6, "`scheduler.push`", called
    /// from within a running event's task). Routes through the same barrier-clamping and
    /// end-time-discard rules as any other push (§4.1); returns `false` if the event was
    /// discarded for having `time >= global_end_time`.
    ///
    /// Panics if called before the host has been registered with a [`crate::policy::SchedulingPolicy`],
    /// or after the policy that registered it has been dropped.
    pub fn schedule(&self, time: SimulationTime, receiver: HostId, task: Task) -> bool {
        let router = self
            .router
            .get()
            .expect("host.schedule called before the host was registered with a policy")
            .upgrade()
            .expect("host.schedule called after its scheduling policy was dropped");
        router.push(Some(self.id), receiver, time, task)
    }

    pub fn id(&self) -> HostId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &HostStats {
        &self.stats
    }

    /// Atomically allocate the next sequence number for an event sent by this host, per §4.1
    /// ("`push` assigns `event.sequence` ... from the sender host's counter").
    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Assign this host to a worker thread, once. Panics if called twice — the scheduling
    /// policy only ever assigns a host once, during `start` (§3, "set once during start,
    /// immutable thereafter").
    pub fn assign_worker(&self, worker: usize) {
        self.assigned_worker
            .set(worker)
            .expect("host assigned to a worker more than once");
    }

    pub fn assigned_worker(&self) -> Option<usize> {
        self.assigned_worker.get().copied()
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::Acquire)
    }

    /// Mark the host as exiting (all its processes dead); future `execute` calls become no-ops
    /// per §4.6.
    pub fn set_exiting(&self) {
        self.exiting.store(true, Ordering::Release);
    }

    pub fn current_time(&self) -> EmulatedTime {
        self.current_time.load(Ordering::Acquire)
    }

    fn set_current_time(&self, time: EmulatedTime) {
        self.current_time.store(time, Ordering::Release);
    }

    /// Lock this host's queue. Safe to call re-entrantly from the thread that already holds it
    /// (e.g. a running event that schedules another event back onto the same host).
    pub(crate) fn lock(&self) -> impl std::ops::DerefMut<Target = HostQueue> + '_ {
        self.queue.lock()
    }

    /// `host.next_event_time() -> EmulatedTime` (§6); `None` stands in for the spec's `INVALID`
    /// sentinel, since Rust already has a type for "no value" and there's no FFI boundary here
    /// that needs a raw `u64::MAX`.
    pub fn next_event_time(&self) -> Option<EmulatedTime> {
        self.lock()
            .next_event_time()
            .map(EmulatedTime::from_abs_simtime)
    }

    /// Register a one-time startup task, run by the first `boot()` call (§6, "One-time startup,
    /// during first round").
    pub fn set_boot_task(&self, task: Task) {
        *self.boot_task.lock().unwrap() = Some(task);
    }

    /// Run the boot task exactly once. Subsequent calls are no-ops. A fault in the boot task is
    /// handled the same way as any other event fault (§6, §7): logged and counted, never
    /// propagated, since boot runs inside the same per-host execution context as any other task.
    pub fn boot(&self) {
        if self.booted.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut task = self.boot_task.lock().unwrap().take();
        if let Some(task) = &mut task {
            if let Err(err) = task.run(self) {
                log::warn!("boot fault on {}: {:#}", self.name(), err);
                self.stats.record_fault();
            }
        }
    }

    /// `host.execute(barrier)` (§4.6): drain every event with `time < barrier`, in order,
    /// running each one's task; log and count (never propagate) a fault from an individual
    /// event. No-op if the host has declared itself exiting.
    pub fn execute(&self, barrier: EmulatedTime) {
        if self.is_exiting() {
            return;
        }

        let barrier_sim = barrier.to_abs_simtime();
        let mut last_popped = None;

        loop {
            let next = {
                let mut queue = self.lock();
                match queue.next_event_time() {
                    Some(t) if t < barrier_sim => queue.pop(),
                    _ => None,
                }
            };
            let Some(mut event) = next else { break };
            let event_time = event.time();

            let _clock = crate::worker::enter(EmulatedTime::from_abs_simtime(event_time));
            if let Err(err) = event.run(self) {
                log::warn!(
                    "event fault on {} at {:?}: {:#}",
                    self.name(),
                    event_time,
                    err
                );
                self.stats.record_fault();
            }

            last_popped = Some(event_time);
        }

        let new_clock = match last_popped {
            Some(t) => std::cmp::min(barrier, EmulatedTime::from_abs_simtime(t)),
            None => barrier,
        };
        self.set_current_time(new_clock);
    }
}

/// Assigns stable [`HostId`]s from host names and rejects duplicates at registration time (§7,
/// "Duplicate host name at `add_host`: Fatal init error before `start`").
///
/// Uses a `BTreeMap`, not a `HashMap`, for the same reason the teacher's configuration layer
/// does (§10.3): deterministic iteration order over registered hosts feeds the deterministic
/// host-shuffle RNG used when hosts are assigned to workers.
#[derive(Debug, Default)]
pub struct HostRegistry {
    by_name: BTreeMap<String, HostId>,
    next_id: u32,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_host(&mut self, name: impl Into<String>) -> anyhow::Result<HostId> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            anyhow::bail!("duplicate host name '{name}'");
        }
        let id = HostId(self.next_id);
        self.next_id += 1;
        self.by_name.insert(name, id);
        Ok(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, HostId)> {
        self.by_name.iter().map(|(name, id)| (name.as_str(), *id))
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Task};
    use sim_time::SimulationTime;
    use std::sync::Arc;

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut reg = HostRegistry::new();
        reg.add_host("alice").unwrap();
        assert!(reg.add_host("alice").is_err());
    }

    #[test]
    fn registry_assigns_stable_ids_in_insertion_order() {
        let mut reg = HostRegistry::new();
        let a = reg.add_host("alice").unwrap();
        let b = reg.add_host("bob").unwrap();
        assert_ne!(a, b);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn execute_drains_events_before_barrier_and_advances_clock() {
        let host = Host::new(HostId::from_raw(0), "h");
        let order = Arc::new(Mutex::new(Vec::new()));

        for t in [1u64, 3, 5, 10] {
            let order = Arc::clone(&order);
            let task = Task::new(move |_host| {
                order.lock().unwrap().push(t);
                Ok(())
            });
            let event = Event::new(SimulationTime::from_secs(t), None, host.id(), task);
            host.lock().push(event);
        }

        let barrier = EmulatedTime::from_abs_simtime(SimulationTime::from_secs(6));
        host.execute(barrier);

        assert_eq!(*order.lock().unwrap(), vec![1, 3, 5]);
        assert_eq!(
            host.current_time(),
            EmulatedTime::from_abs_simtime(SimulationTime::from_secs(5))
        );
        assert_eq!(
            host.next_event_time(),
            Some(EmulatedTime::from_abs_simtime(SimulationTime::from_secs(10)))
        );
    }

    #[test]
    fn execute_advances_clock_to_barrier_when_queue_empty() {
        let host = Host::new(HostId::from_raw(0), "h");
        let barrier = EmulatedTime::from_abs_simtime(SimulationTime::from_secs(100));
        host.execute(barrier);
        assert_eq!(host.current_time(), barrier);
    }

    #[test]
    fn faulting_event_is_counted_not_propagated() {
        let host = Host::new(HostId::from_raw(0), "h");
        let task = Task::new(|_host| anyhow::bail!("boom"));
        host.lock()
            .push(Event::new(SimulationTime::ZERO, None, host.id(), task));

        host.execute(EmulatedTime::from_abs_simtime(SimulationTime::from_secs(1)));

        assert_eq!(host.stats().events_faulted(), 1);
    }

    #[test]
    fn exiting_host_execute_is_a_noop() {
        let host = Host::new(HostId::from_raw(0), "h");
        let ran = Arc::new(Mutex::new(false));
        let ran2 = Arc::clone(&ran);
        host.lock().push(Event::new(
            SimulationTime::ZERO,
            None,
            host.id(),
            Task::new(move |_| {
                *ran2.lock().unwrap() = true;
                Ok(())
            }),
        ));
        host.set_exiting();
        host.execute(EmulatedTime::from_abs_simtime(SimulationTime::from_secs(1)));
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    fn lock_is_reentrant_on_the_same_thread() {
        let host = Host::new(HostId::from_raw(0), "h");
        let outer = host.lock();
        let inner = host.lock();
        drop(inner);
        drop(outer);
    }

    #[test]
    fn boot_runs_exactly_once() {
        let host = Host::new(HostId::from_raw(0), "h");
        let count = Arc::new(Mutex::new(0));
        let count2 = Arc::clone(&count);
        host.set_boot_task(Task::new(move |_| {
            *count2.lock().unwrap() += 1;
            Ok(())
        }));
        host.boot();
        host.boot();
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
