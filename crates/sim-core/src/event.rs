//! Time-tagged, host-addressed units of work with a total order.

use std::fmt;

use sim_time::SimulationTime;

use crate::host::{Host, HostId};

/// A unit of work attached to an [`Event`].
///
/// Mirrors the teacher's observation that, absent a C boundary to cross, a task is most simply a
/// `FnMut(&Host) -> anyhow::Result<()>` trait object: the closure mutates the host through its
/// interior-mutable API (its queue lock, atomics) rather than through `&mut Host`, since a host is
/// always reached through a shared reference once it is registered with the scheduler.
pub struct Task(Box<dyn FnMut(&Host) -> anyhow::Result<()> + Send>);

impl Task {
    pub fn new(f: impl FnMut(&Host) -> anyhow::Result<()> + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub(crate) fn run(&mut self, host: &Host) -> anyhow::Result<()> {
        (self.0)(host)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Task").field(&"<opaque>").finish()
    }
}

/// An event addressed to [`Event::receiver`], carrying an opaque [`Task`] payload.
///
/// Total order is `(time, receiver, sequence, sender)` lexicographic, per the data model: the
/// first three fields are the contract named in the specification; `sender` is an extra
/// deterministic tie-break appended so the order is total even when two different senders each
/// push their own first event (`sequence == 0`) to the same receiver at the same time. Unlike the
/// teacher's `Event`, whose `PartialOrd` can return `None` when two events with equal
/// `(time, receiver, sender, sequence)` carry different, incomparable tasks, this order never
/// needs a `PanickingOrd` wrapper: it is computed entirely from plain data, never from the task.
#[derive(Debug)]
pub struct Event {
    time: SimulationTime,
    sequence: u64,
    sender: Option<HostId>,
    receiver: HostId,
    task: Task,
}

impl Event {
    pub fn new(time: SimulationTime, sender: Option<HostId>, receiver: HostId, task: Task) -> Self {
        Self {
            time,
            sequence: 0,
            sender,
            receiver,
            task,
        }
    }

    pub fn time(&self) -> SimulationTime {
        self.time
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn sender(&self) -> Option<HostId> {
        self.sender
    }

    pub fn receiver(&self) -> HostId {
        self.receiver
    }

    /// Raise this event's time to `time`, used for barrier clamping (§4.1). Never lowers it.
    pub(crate) fn clamp_time_to(&mut self, time: SimulationTime) {
        if time > self.time {
            self.time = time;
        }
    }

    /// Assign the sequence number taken from the sender host's counter at push time.
    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub(crate) fn run(&mut self, host: &Host) -> anyhow::Result<()> {
        self.task.run(host)
    }

    fn key(&self) -> (SimulationTime, HostId, u64, Option<HostId>) {
        (self.time, self.receiver, self.sequence, self.sender)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_task() -> Task {
        Task::new(|_host| Ok(()))
    }

    #[test]
    fn orders_by_time_first() {
        let receiver = HostId::from_raw(0);
        let mut a = Event::new(SimulationTime::from_secs(1), None, receiver, noop_task());
        let mut b = Event::new(SimulationTime::from_secs(2), None, receiver, noop_task());
        a.set_sequence(5);
        b.set_sequence(0);
        assert!(a < b);
    }

    #[test]
    fn orders_by_receiver_before_sequence() {
        let mut a = Event::new(
            SimulationTime::ZERO,
            None,
            HostId::from_raw(0),
            noop_task(),
        );
        let mut b = Event::new(
            SimulationTime::ZERO,
            None,
            HostId::from_raw(1),
            noop_task(),
        );
        a.set_sequence(100);
        b.set_sequence(0);
        assert!(a < b);
    }

    #[test]
    fn same_sender_preserves_send_order() {
        let sender = Some(HostId::from_raw(7));
        let receiver = HostId::from_raw(1);
        let mut first = Event::new(SimulationTime::ZERO, sender, receiver, noop_task());
        let mut second = Event::new(SimulationTime::ZERO, sender, receiver, noop_task());
        first.set_sequence(0);
        second.set_sequence(1);
        assert!(first < second);
    }

    #[test]
    fn clamp_only_raises() {
        let mut e = Event::new(SimulationTime::from_secs(5), None, HostId::from_raw(0), noop_task());
        e.clamp_time_to(SimulationTime::from_secs(1));
        assert_eq!(e.time(), SimulationTime::from_secs(5));
        e.clamp_time_to(SimulationTime::from_secs(9));
        assert_eq!(e.time(), SimulationTime::from_secs(9));
    }
}
