/*!
Time types shared across the simulation engine.

[`SimulationTime`] is a nanosecond-resolution duration, and [`EmulatedTime`] is an instant
built from a `SimulationTime` offset from [`EmulatedTime::SIMULATION_START`]. Every event,
round boundary, and runahead value in the engine is expressed in one of these two types so
that arithmetic between a duration and an instant can't be confused for arithmetic between two
instants.
*/

pub mod emulated_time;
pub mod simulation_time;

pub use emulated_time::EmulatedTime;
pub use simulation_time::SimulationTime;
