//! Per-host priority queue of pending [`Event`]s; the sole owner of its host's events.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use sim_time::SimulationTime;

use crate::event::Event;

/// A min-heap of [`Event`]s ordered by the total order in [`Event::cmp`].
///
/// Grounded on the teacher's `EventQueue` (`main/core/work/event_queue.rs`): a `BinaryHeap` of
/// `Reverse<_>` plus a monotonicity assertion on both ends. This queue skips the teacher's
/// `PanickingOrd` wrapper because [`Event`]'s `Ord` is already total (see its doc comment) and
/// never panics.
#[derive(Debug, Default)]
pub struct HostQueue {
    queue: BinaryHeap<Reverse<Event>>,
    last_popped_time: SimulationTime,
}

impl HostQueue {
    pub fn new() -> Self {
        Self {
            queue: BinaryHeap::new(),
            last_popped_time: SimulationTime::ZERO,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Push a new event onto the queue.
    ///
    /// Panics if `event.time()` is earlier than the time of the last popped event — time must
    /// never move backward for a single host (§7, "Queue invariant violation").
    pub fn push(&mut self, event: Event) {
        assert!(
            event.time() >= self.last_popped_time,
            "event time {:?} moved backward past last popped time {:?}",
            event.time(),
            self.last_popped_time,
        );
        self.queue.push(Reverse(event));
    }

    /// Pop the earliest event from the queue, in the total order of §3.
    pub fn pop(&mut self) -> Option<Event> {
        let event = self.queue.pop().map(|Reverse(e)| e);
        if let Some(ref event) = event {
            assert!(event.time() >= self.last_popped_time);
            self.last_popped_time = event.time();
        }
        event
    }

    /// The time of the earliest event in the queue, if any.
    pub fn next_event_time(&self) -> Option<SimulationTime> {
        self.queue.peek().map(|Reverse(e)| e.time())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Task;
    use crate::host::HostId;

    fn event_at(secs: u64, seq: u64) -> Event {
        let mut e = Event::new(
            SimulationTime::from_secs(secs),
            None,
            HostId::from_raw(0),
            Task::new(|_| Ok(())),
        );
        e.set_sequence(seq);
        e
    }

    #[test]
    fn pops_in_time_order() {
        let mut q = HostQueue::new();
        q.push(event_at(5, 0));
        q.push(event_at(1, 0));
        q.push(event_at(3, 0));

        assert_eq!(q.pop().unwrap().time(), SimulationTime::from_secs(1));
        assert_eq!(q.pop().unwrap().time(), SimulationTime::from_secs(3));
        assert_eq!(q.pop().unwrap().time(), SimulationTime::from_secs(5));
        assert!(q.pop().is_none());
    }

    #[test]
    fn next_event_time_peeks_without_removing() {
        let mut q = HostQueue::new();
        assert_eq!(q.next_event_time(), None);
        q.push(event_at(2, 0));
        assert_eq!(q.next_event_time(), Some(SimulationTime::from_secs(2)));
        assert_eq!(q.len(), 1);
    }

    #[test]
    #[should_panic]
    fn panics_when_time_moves_backward() {
        let mut q = HostQueue::new();
        q.push(event_at(5, 0));
        assert_eq!(q.pop().unwrap().time(), SimulationTime::from_secs(5));
        q.push(event_at(1, 0));
    }
}
