/*!
The parallel discrete-event simulation engine core.

This crate ties [`sim_time`]'s time types and [`sim_scheduler`]'s worker pool together into a
complete round-based simulation driver: an [`Event`] total order, a per-host [`HostQueue`], a
[`policy::SchedulingPolicy`] that routes pushed events and enforces barrier clamping, a
[`Runahead`] controller for the execution window length, and the [`round::RoundScheduler`] /
[`controller::Controller`] pair that drives the whole thing to completion.

Library code in this crate only ever uses the `log` facade; it never installs a logger. The
`sim-cli` binary crate is responsible for installing one (see [`logging`]).
*/

#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod controller;
pub mod event;
pub mod host;
pub mod host_queue;
pub mod logging;
pub mod policy;
pub mod round;
pub mod runahead;
pub mod stats;
pub mod worker;

pub use config::{CliOptions, ConfigFileOptions, ConfigOptions, HostConfig, SchedulerPolicyKind};
pub use controller::Controller;
pub use event::Event;
pub use host::{Host, HostId};
pub use host_queue::HostQueue;
pub use policy::SchedulingPolicy;
pub use round::RoundScheduler;
pub use runahead::Runahead;
pub use stats::HostStats;
