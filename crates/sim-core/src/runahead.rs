//! Dynamic runahead (§4.5): the effective per-round window length, grounded on the teacher's
//! `main/core/runahead.rs`.

use std::sync::RwLock;

use sim_time::SimulationTime;

/// Decides the runahead (round length) for the next scheduling round.
///
/// A larger runahead lets more hosts and events run in parallel per round, but delays
/// cross-worker events further into the future than their latency strictly requires. Static
/// runahead uses the network's `min_possible_latency` unconditionally; dynamic runahead instead
/// tracks the smallest latency any host has actually used so far and grows the window once it's
/// established no host needs a shorter one. Both have a user-configurable lower bound.
#[derive(Debug)]
pub struct Runahead {
    min_used_latency: RwLock<Option<SimulationTime>>,
    min_possible_latency: SimulationTime,
    min_runahead_config: Option<SimulationTime>,
    is_runahead_dynamic: bool,
}

impl Runahead {
    pub fn new(
        is_runahead_dynamic: bool,
        min_possible_latency: SimulationTime,
        min_runahead_config: Option<SimulationTime>,
    ) -> Self {
        assert!(!min_possible_latency.is_zero());

        Self {
            min_used_latency: RwLock::new(None),
            min_possible_latency,
            min_runahead_config,
            is_runahead_dynamic,
        }
    }

    /// The runahead to use for the next round.
    pub fn get(&self) -> SimulationTime {
        let runahead = self
            .min_used_latency
            .read()
            .unwrap()
            .unwrap_or(self.min_possible_latency);

        let runahead_config = self.min_runahead_config.unwrap_or(SimulationTime::ZERO);
        std::cmp::max(runahead, runahead_config)
    }

    /// If dynamic runahead is enabled, compare and possibly shorten the stored minimum used
    /// latency. Uses a double-checked-locking pattern: a cheap read-lock check first, then an
    /// exclusive write-lock re-check before mutating, so the common case (no update needed)
    /// never takes the write lock.
    pub fn update_lowest_used_latency(&self, latency: SimulationTime) {
        assert!(latency > SimulationTime::ZERO);

        if !self.is_runahead_dynamic {
            return;
        }

        let should_update = |min_used_latency: &Option<SimulationTime>| match min_used_latency {
            Some(min) if latency >= *min => false,
            _ => true,
        };

        {
            let min_used_latency = self.min_used_latency.read().unwrap();
            if !should_update(&min_used_latency) {
                return;
            }
        }

        let old_runahead;
        {
            let mut min_used_latency = self.min_used_latency.write().unwrap();
            if !should_update(&min_used_latency) {
                return;
            }
            old_runahead = *min_used_latency;
            *min_used_latency = Some(latency);
        }

        log::info!(
            "runahead for next round updated from {:?} ns to {} ns (config floor {:?} ns)",
            old_runahead.map(|x| x.as_nanos()),
            latency.as_nanos(),
            self.min_runahead_config.map(|x| x.as_nanos()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_runahead_uses_min_possible_latency() {
        let r = Runahead::new(false, SimulationTime::from_millis(100), None);
        assert_eq!(r.get(), SimulationTime::from_millis(100));
        // disabled dynamic runahead: updates are ignored.
        r.update_lowest_used_latency(SimulationTime::from_millis(1));
        assert_eq!(r.get(), SimulationTime::from_millis(100));
    }

    #[test]
    fn dynamic_runahead_shrinks_with_smaller_observed_latency() {
        let r = Runahead::new(true, SimulationTime::from_millis(100), None);
        assert_eq!(r.get(), SimulationTime::from_millis(100));
        r.update_lowest_used_latency(SimulationTime::from_millis(10));
        assert_eq!(r.get(), SimulationTime::from_millis(10));
        // a larger observed latency never widens it back out.
        r.update_lowest_used_latency(SimulationTime::from_millis(50));
        assert_eq!(r.get(), SimulationTime::from_millis(10));
    }

    #[test]
    fn config_floor_wins_over_a_smaller_observed_latency() {
        let r = Runahead::new(
            true,
            SimulationTime::from_millis(100),
            Some(SimulationTime::from_millis(20)),
        );
        r.update_lowest_used_latency(SimulationTime::from_millis(1));
        assert_eq!(r.get(), SimulationTime::from_millis(20));
    }

    #[test]
    #[should_panic]
    fn rejects_zero_min_possible_latency() {
        Runahead::new(false, SimulationTime::ZERO, None);
    }
}
