//! Layered configuration (§10.3): CLI flags merged against an optional YAML config file into a
//! single [`ConfigOptions`], grounded on the teacher's `main/core/support/configuration.rs` and
//! its `CliOptions` / `ConfigFileOptions` / `ConfigOptions` three-stage shape.

use std::collections::BTreeMap;

use clap::Parser;
use merge::Merge;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use sim_time::SimulationTime;

pub use crate::policy::SchedulerPolicyKind;

/// Log verbosity recognized by both the CLI flag and the config file (§10.1, §10.3).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// A host's config-file entry.
///
/// Intentionally empty: per-process, per-network, and per-IP host configuration belong to the
/// syscall/network subsystems this crate treats as opaque collaborators (§1, OUT OF SCOPE), so
/// there's nothing for this crate's `HostConfig` to carry yet. The type exists anyway, rather
/// than using `()`, so the config file's `hosts` map has a stable place to grow per-host fields
/// into as embedder crates are added, and so `#[serde(deny_unknown_fields)]` can still catch a
/// typo'd host key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {}

/// Options that can be set on the command line and overridden per the config file; every field
/// is optional so that an unset CLI flag falls back to the config file, and an unset config file
/// value falls back to the hardcoded default in [`ConfigOptions::new`].
#[derive(Debug, Clone, Default, clap::Args, Serialize, Deserialize, Merge, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct GeneralOptions {
    /// Number of worker threads. 0 runs every host on the calling thread with no worker pool
    /// (§5, §8 "n_workers == 0").
    #[arg(long)]
    pub n_workers: Option<u32>,

    /// Scheduling policy (§4.2, §6).
    #[arg(long, value_enum)]
    pub policy: Option<SchedulerPolicyKind>,

    /// Seeds the deterministic host-shuffle RNG (§9).
    #[arg(long)]
    pub random_seed: Option<u64>,

    /// Absolute simulation cutoff, in seconds (§6 `end_time`).
    #[arg(long, value_name = "seconds")]
    pub end_time_secs: Option<u64>,

    /// Minimum one-way path latency across the network topology, in milliseconds; the lower
    /// bound on execution-window length (§4.5, §6 `min_path_latency`).
    #[arg(long, value_name = "milliseconds")]
    pub min_path_latency_ms: Option<u64>,

    /// Cap on simultaneously-running workers. Required to be `>= n_workers` when
    /// `policy = steal` (§4.2, §7).
    #[arg(long)]
    pub max_concurrency: Option<u32>,

    /// Pin each worker thread to a CPU, round-robin across available CPUs (§4.3). Advisory: the
    /// specification leaves affinity pinning optional (§9 open questions), so this defaults off.
    #[arg(long)]
    pub cpu_pinning: Option<bool>,

    /// Log verbosity; a `--log-level` flag wins over an equivalent config-file value (§10.1).
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}

/// The full shape of a YAML configuration file: CLI-overridable [`GeneralOptions`] plus the
/// host set, which the CLI never overrides (§10.3).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFileOptions {
    pub general: GeneralOptions,

    /// A `BTreeMap`, not a `HashMap`: deterministic iteration order feeds the deterministic
    /// host-shuffle RNG (§9) that assigns hosts to workers, so a hash-ordered map would make
    /// host->worker placement depend on hashmap iteration order and break the determinism
    /// property in §8.
    pub hosts: BTreeMap<String, HostConfig>,
}

/// Command-line flags (§10.4), parsed by `sim-cli`'s `main`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sim-cli",
    version,
    about = "Run the parallel discrete-event simulation engine"
)]
pub struct CliOptions {
    /// Path to a YAML configuration file. Use '-' to read from stdin.
    #[arg(required_unless_present = "show_config_schema")]
    pub config: Option<String>,

    /// Print the fully merged configuration and exit, without running the simulation.
    #[arg(long)]
    pub show_config: bool,

    /// Print the JSON Schema for the configuration file format and exit.
    #[arg(long)]
    pub show_config_schema: bool,

    #[command(flatten)]
    pub general: GeneralOptions,
}

/// The merged, defaulted configuration the CLI feeds to the controller (§10.3).
#[derive(Debug, Clone)]
pub struct ConfigOptions {
    pub n_workers: u32,
    pub policy: SchedulerPolicyKind,
    pub random_seed: u64,
    pub end_time: SimulationTime,
    pub min_path_latency: SimulationTime,
    pub max_concurrency: Option<u32>,
    pub cpu_pinning: bool,
    pub log_level: LogLevel,
    pub hosts: BTreeMap<String, HostConfig>,
}

impl ConfigOptions {
    /// Merge `cli` over `config_file`, then apply the engine's hardcoded defaults to whatever's
    /// still unset, matching the teacher's `ConfigOptions::new(config_file, options)` two-stage
    /// merge.
    pub fn new(config_file: ConfigFileOptions, cli: CliOptions) -> Self {
        let mut general = cli.general;
        general.merge(config_file.general);

        Self {
            n_workers: general.n_workers.unwrap_or(0),
            policy: general.policy.unwrap_or(SchedulerPolicyKind::Host),
            random_seed: general.random_seed.unwrap_or(0),
            end_time: SimulationTime::from_secs(general.end_time_secs.unwrap_or(60)),
            min_path_latency: SimulationTime::from_millis(
                general.min_path_latency_ms.unwrap_or(10),
            ),
            max_concurrency: general.max_concurrency,
            cpu_pinning: general.cpu_pinning.unwrap_or(false),
            log_level: general.log_level.unwrap_or(LogLevel::Info),
            hosts: config_file.hosts,
        }
    }

    /// The JSON Schema for [`ConfigFileOptions`], for `--show-config-schema` (§10.3, matching
    /// the teacher's `schemars::schema_for!` use).
    pub fn file_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ConfigFileOptions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flag_overrides_config_file_value() {
        let config_file = ConfigFileOptions {
            general: GeneralOptions {
                n_workers: Some(4),
                ..Default::default()
            },
            hosts: BTreeMap::new(),
        };
        let cli = CliOptions {
            config: Some("sim.yaml".into()),
            show_config: false,
            show_config_schema: false,
            general: GeneralOptions {
                n_workers: Some(8),
                ..Default::default()
            },
        };
        let merged = ConfigOptions::new(config_file, cli);
        assert_eq!(merged.n_workers, 8);
    }

    #[test]
    fn config_file_value_used_when_cli_flag_unset() {
        let config_file = ConfigFileOptions {
            general: GeneralOptions {
                policy: Some(SchedulerPolicyKind::Steal),
                ..Default::default()
            },
            hosts: BTreeMap::new(),
        };
        let cli = CliOptions {
            config: Some("sim.yaml".into()),
            show_config: false,
            show_config_schema: false,
            general: GeneralOptions::default(),
        };
        let merged = ConfigOptions::new(config_file, cli);
        assert_eq!(merged.policy, SchedulerPolicyKind::Steal);
    }

    #[test]
    fn unset_fields_fall_back_to_hardcoded_defaults() {
        let merged = ConfigOptions::new(
            ConfigFileOptions::default(),
            CliOptions {
                config: Some("sim.yaml".into()),
                show_config: false,
                show_config_schema: false,
                general: GeneralOptions::default(),
            },
        );
        assert_eq!(merged.n_workers, 0);
        assert_eq!(merged.policy, SchedulerPolicyKind::Host);
        assert_eq!(merged.end_time, SimulationTime::from_secs(60));
        assert_eq!(merged.min_path_latency, SimulationTime::from_millis(10));
        assert!(!merged.cpu_pinning);
    }

    #[test]
    fn rejects_unknown_config_file_keys() {
        let yaml = "general:\n  n_workers: 2\nhosts: {}\nbogus: true\n";
        let err = serde_yaml::from_str::<ConfigFileOptions>(yaml).unwrap_err();
        assert!(err.to_string().contains("bogus") || err.to_string().contains("unknown field"));
    }

    #[test]
    fn deserializes_host_map_in_sorted_order() {
        let yaml = "general: {}\nhosts:\n  zeta: {}\n  alpha: {}\n  mike: {}\n";
        let parsed: ConfigFileOptions = serde_yaml::from_str(yaml).unwrap();
        let names: Vec<_> = parsed.hosts.keys().collect();
        assert_eq!(names, vec!["alpha", "mike", "zeta"]);
    }
}
