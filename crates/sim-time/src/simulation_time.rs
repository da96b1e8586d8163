/*!
Values for working with a simulated duration. Use `EmulatedTime` to represent an instant in time.

`SimulationTime` represents a time interval (a duration), while `EmulatedTime` represents an
instant in time.
*/

use std::time::Duration;

use super::emulated_time;

#[derive(Copy, Clone, Eq, PartialEq, Debug, PartialOrd, Ord, Hash)]
pub struct SimulationTime(CSimulationTime);

pub type CSimulationTime = u64;

impl SimulationTime {
    /// Maximum value. Currently equivalent to SIMTIME_MAX to avoid surprises when comparing
    /// against the nanosecond-resolution constants below.
    pub const MAX: SimulationTime = SimulationTime(SIMTIME_MAX);
    pub const ZERO: SimulationTime = SimulationTime(0);
    pub const SECOND: SimulationTime = SimulationTime(SIMTIME_ONE_SECOND);
    pub const MILLISECOND: SimulationTime = SimulationTime(SIMTIME_ONE_MILLISECOND);
    pub const MICROSECOND: SimulationTime = SimulationTime(SIMTIME_ONE_MICROSECOND);
    pub const NANOSECOND: SimulationTime = SimulationTime(SIMTIME_ONE_NANOSECOND);

    pub fn from_c_simtime(val: CSimulationTime) -> Option<Self> {
        if val == SIMTIME_INVALID {
            return None;
        }

        if val > SIMTIME_MAX {
            return None;
        }

        Some(Self(val / SIMTIME_ONE_NANOSECOND))
    }

    pub fn to_c_simtime(val: Option<Self>) -> CSimulationTime {
        if let Some(val) = val {
            val.0
        } else {
            SIMTIME_INVALID
        }
    }

    /// Convert a [`Duration`] to a [`SimulationTime`]. This function exists as a `const`
    /// alternative to `SimulationTime::try_from(duration)`. Panics if the duration is too large.
    pub const fn from_duration(val: std::time::Duration) -> Self {
        if SIMTIME_ONE_NANOSECOND != 1 {
            unreachable!();
        }

        let val = val.as_nanos();
        if val > SIMTIME_MAX as u128 {
            panic!("Duration is larger than SIMTIME_MAX");
        }

        Self(val as u64)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn as_secs(&self) -> u64 {
        self.0 / SIMTIME_ONE_SECOND
    }

    pub fn as_millis(&self) -> u64 {
        self.0 / SIMTIME_ONE_MILLISECOND
    }

    pub fn as_micros(&self) -> u64 {
        self.0 / SIMTIME_ONE_MICROSECOND
    }

    pub fn as_nanos(&self) -> u128 {
        (self.0 / SIMTIME_ONE_NANOSECOND).into()
    }

    pub fn as_nanos_f64(&self) -> f64 {
        self.as_nanos() as f64
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(sum) => SimulationTime::from_c_simtime(sum),
            None => None,
        }
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(difference) => SimulationTime::from_c_simtime(difference),
            None => None,
        }
    }

    pub fn checked_mul(self, other: u64) -> Option<Self> {
        match self.0.checked_mul(other) {
            Some(product) => SimulationTime::from_c_simtime(product),
            None => None,
        }
    }

    pub fn checked_div(self, other: u64) -> Option<Self> {
        match self.0.checked_div(other) {
            Some(quotient) => SimulationTime::from_c_simtime(quotient),
            None => None,
        }
    }

    pub fn checked_rem(self, other: Self) -> Option<Self> {
        match self.0.checked_rem(other.0) {
            Some(rem) => SimulationTime::from_c_simtime(rem),
            None => None,
        }
    }

    pub fn saturating_add(self, other: Self) -> Self {
        let sum = self.0.checked_add(other.0).unwrap_or(SIMTIME_MAX);
        SimulationTime::from_c_simtime(sum).unwrap()
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        let difference = self.0.checked_sub(other.0).unwrap_or(SIMTIME_MIN);
        SimulationTime::from_c_simtime(difference).unwrap()
    }

    pub fn saturating_mul(self, other: u64) -> Self {
        let product = self.0.checked_mul(other).unwrap_or(SIMTIME_MAX);
        SimulationTime::from_c_simtime(product).unwrap()
    }

    pub fn try_from_secs(s: u64) -> Option<Self> {
        Self::SECOND.checked_mul(s)
    }

    pub fn from_secs(s: u64) -> Self {
        Self::try_from_secs(s).unwrap()
    }

    pub fn try_from_millis(s: u64) -> Option<Self> {
        Self::MILLISECOND.checked_mul(s)
    }

    pub fn from_millis(s: u64) -> Self {
        Self::try_from_millis(s).unwrap()
    }

    pub fn try_from_micros(s: u64) -> Option<Self> {
        Self::MICROSECOND.checked_mul(s)
    }

    pub fn from_micros(s: u64) -> Self {
        Self::try_from_micros(s).unwrap()
    }

    pub fn try_from_nanos(s: u64) -> Option<Self> {
        Self::NANOSECOND.checked_mul(s)
    }

    pub fn from_nanos(s: u64) -> Self {
        Self::try_from_nanos(s).unwrap()
    }

    pub fn subsec_millis(&self) -> u32 {
        (self.as_millis() % 1_000).try_into().unwrap()
    }

    pub fn subsec_micros(&self) -> u32 {
        (self.as_micros() % 1_000_000).try_into().unwrap()
    }

    pub fn subsec_nanos(&self) -> u32 {
        (self.as_nanos() % 1_000_000_000).try_into().unwrap()
    }
}

impl std::ops::Add<SimulationTime> for SimulationTime {
    type Output = SimulationTime;

    fn add(self, other: Self) -> Self::Output {
        self.checked_add(other).unwrap()
    }
}

impl std::ops::AddAssign<SimulationTime> for SimulationTime {
    fn add_assign(&mut self, rhs: SimulationTime) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub<SimulationTime> for SimulationTime {
    type Output = SimulationTime;

    fn sub(self, other: Self) -> Self::Output {
        self.checked_sub(other).unwrap()
    }
}

impl std::ops::SubAssign<SimulationTime> for SimulationTime {
    fn sub_assign(&mut self, rhs: SimulationTime) {
        *self = *self - rhs;
    }
}

impl std::ops::Mul<u32> for SimulationTime {
    type Output = SimulationTime;

    fn mul(self, other: u32) -> Self::Output {
        self.checked_mul(other.into()).unwrap()
    }
}

impl std::ops::MulAssign<u32> for SimulationTime {
    fn mul_assign(&mut self, rhs: u32) {
        *self = self.checked_mul(rhs.into()).unwrap();
    }
}

impl std::ops::Div<u32> for SimulationTime {
    type Output = SimulationTime;

    fn div(self, other: u32) -> Self::Output {
        self.checked_div(other.into()).unwrap()
    }
}

impl std::ops::DivAssign<u32> for SimulationTime {
    fn div_assign(&mut self, rhs: u32) {
        *self = self.checked_div(rhs.into()).unwrap();
    }
}

impl std::ops::Rem<SimulationTime> for SimulationTime {
    type Output = SimulationTime;

    fn rem(self, other: SimulationTime) -> Self::Output {
        self.checked_rem(other).unwrap()
    }
}

impl std::convert::TryFrom<std::time::Duration> for SimulationTime {
    type Error = ();

    fn try_from(val: std::time::Duration) -> Result<Self, Self::Error> {
        debug_assert_eq!(SIMTIME_ONE_NANOSECOND, 1);
        let val = val.as_nanos();
        if val > SIMTIME_MAX.into() {
            Err(())
        } else {
            Ok(Self(val.try_into().unwrap()))
        }
    }
}

impl std::convert::From<SimulationTime> for std::time::Duration {
    fn from(val: SimulationTime) -> std::time::Duration {
        debug_assert_eq!(SIMTIME_ONE_NANOSECOND, 1);
        Duration::from_nanos(val.0)
    }
}

impl std::convert::From<SimulationTime> for CSimulationTime {
    fn from(val: SimulationTime) -> CSimulationTime {
        val.0
    }
}

/// Invalid simulation time.
pub const SIMTIME_INVALID: CSimulationTime = u64::MAX;

/// Maximum and minimum valid values.
pub const SIMTIME_MAX: CSimulationTime = 17500059273709551614u64;
const _: () =
    assert!(SIMTIME_MAX == emulated_time::EMUTIME_MAX - emulated_time::EMUTIME_SIMULATION_START);

pub const SIMTIME_MIN: CSimulationTime = 0u64;

/// Represents one nanosecond in simulation time.
pub const SIMTIME_ONE_NANOSECOND: CSimulationTime = 1u64;

/// Represents one microsecond in simulation time.
pub const SIMTIME_ONE_MICROSECOND: CSimulationTime = 1000u64;

/// Represents one millisecond in simulation time.
pub const SIMTIME_ONE_MILLISECOND: CSimulationTime = 1000000u64;

/// Represents one second in simulation time.
pub const SIMTIME_ONE_SECOND: CSimulationTime = 1000000000u64;

/// Represents one minute in simulation time.
pub const SIMTIME_ONE_MINUTE: CSimulationTime = 60000000000u64;

/// Represents one hour in simulation time.
pub const SIMTIME_ONE_HOUR: CSimulationTime = 3600000000000u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_csimtime() {
        let sim_time = 5 * SIMTIME_ONE_MINUTE + 7 * SIMTIME_ONE_MILLISECOND;
        let rust_time = SimulationTime::from_c_simtime(sim_time).unwrap();

        assert_eq!(Duration::from(rust_time).as_secs(), 5 * 60);
        assert_eq!(Duration::from(rust_time).as_millis(), 5 * 60 * 1_000 + 7);

        assert_eq!(
            SimulationTime::from_c_simtime(SIMTIME_MAX).unwrap(),
            SimulationTime::try_from(Duration::from_nanos(SIMTIME_MAX / SIMTIME_ONE_NANOSECOND))
                .unwrap()
        );
        assert_eq!(SimulationTime::from_c_simtime(SIMTIME_MAX + 1), None);
    }

    #[test]
    fn test_to_csimtime() {
        let rust_time = SimulationTime::from_secs(5 * 60) + SimulationTime::from_millis(7);
        let sim_time = 5 * SIMTIME_ONE_MINUTE + 7 * SIMTIME_ONE_MILLISECOND;

        assert_eq!(SimulationTime::to_c_simtime(Some(rust_time)), sim_time);
        assert_eq!(SimulationTime::to_c_simtime(None), SIMTIME_INVALID);
        assert_eq!(
            SimulationTime::to_c_simtime(Some(SimulationTime::MAX)),
            SIMTIME_MAX
        );
    }

    #[test]
    fn test_arithmetic() {
        let a = SimulationTime::from_secs(5);
        let b = SimulationTime::from_millis(250);

        assert_eq!(a + b, SimulationTime::from_millis(5_250));
        assert_eq!(a - b, SimulationTime::from_millis(4_750));
        assert_eq!(a * 2, SimulationTime::from_secs(10));
        assert_eq!(a / 5, SimulationTime::from_secs(1));
        assert_eq!(a % b, SimulationTime::ZERO);

        assert_eq!(SimulationTime::MAX.checked_add(SimulationTime::SECOND), None);
        assert_eq!(SimulationTime::ZERO.checked_sub(SimulationTime::SECOND), None);
        assert_eq!(
            SimulationTime::MAX.saturating_add(SimulationTime::SECOND),
            SimulationTime::MAX
        );
        assert_eq!(
            SimulationTime::ZERO.saturating_sub(SimulationTime::SECOND),
            SimulationTime::ZERO
        );
    }

    #[test]
    fn test_duration_roundtrip() {
        let d = Duration::from_nanos(123_456_789);
        let t = SimulationTime::try_from(d).unwrap();
        assert_eq!(Duration::from(t), d);
    }

    #[test]
    fn test_from_duration_panics_when_too_large() {
        let result = std::panic::catch_unwind(|| {
            SimulationTime::from_duration(Duration::from(SimulationTime::MAX) + Duration::from_secs(1))
        });
        assert!(result.is_err());
    }
}
