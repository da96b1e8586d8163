//! Command-line entry point (§10.4), grounded on the teacher's `main/core/main.rs`: parse
//! flags, load and merge the YAML config, install the logger, wire up the hosts named in the
//! config file, and hand the whole thing to [`sim_core::Controller`].
//!
//! The core engine has no notion of what a host actually *does* — that's the syscall/process
//! machinery this crate treats as an out-of-scope collaborator (§1). So this binary's per-host
//! "workload" is a single boot-time log line; it exists to exercise the engine end to end, not
//! to emulate anything. An embedder that wants real host behavior replaces
//! [`build_boot_task`] with its own [`sim_core::event::Task`].

use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use anyhow::Context;
use clap::Parser;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_xoshiro::Xoshiro256PlusPlus;

use sim_core::config::{CliOptions, ConfigFileOptions, ConfigOptions};
use sim_core::event::Task;
use sim_core::host::{Host, HostId};
use sim_core::{Controller, Runahead, RoundScheduler, SchedulingPolicy};

fn main() -> ExitCode {
    let args: Vec<_> = std::env::args_os().collect();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sim-cli: {err:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<std::ffi::OsString>) -> anyhow::Result<()> {
    let options = CliOptions::parse_from(args);

    if options.show_config_schema {
        let schema = ConfigOptions::file_schema();
        println!("{}", render_schema(&schema)?);
        return Ok(());
    }

    let config_path = options
        .config
        .clone()
        .expect("clap guarantees `config` is set unless --show-config-schema was passed");
    let show_config = options.show_config;

    let config_file = load_config_file(&config_path)
        .with_context(|| format!("failed to load configuration file '{config_path}'"))?;

    let config = ConfigOptions::new(config_file, options);

    if show_config {
        println!("{config:#?}");
        return Ok(());
    }

    if config.hosts.is_empty() {
        log::warn!("no hosts defined in the configuration; the simulation will run no events");
    }

    install_signal_handler().context("failed to install SIGINT/SIGTERM handler")?;

    sim_core::logging::init(config.log_level.into())
        .context("logger already installed")?;

    log::info!(
        "starting simulation: n_workers={} policy={:?} end_time={:?} min_path_latency={:?}",
        config.n_workers,
        config.policy,
        config.end_time,
        config.min_path_latency,
    );

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.random_seed);

    let mut hosts: Vec<Arc<Host>> = config
        .hosts
        .keys()
        .enumerate()
        .map(|(i, name)| {
            let host = Arc::new(Host::new(HostId::from_raw(i as u32), name.clone()));
            host.set_boot_task(build_boot_task());
            host
        })
        .collect();
    // shuffle before handing to the scheduling policy: host->worker placement is a function of
    // vector order, so this is the one deterministic source of placement randomness (§9).
    hosts.shuffle(&mut rng);

    let cpu_ids = cpu_ids_for(config.n_workers, config.cpu_pinning);

    let policy = SchedulingPolicy::new(
        config.policy,
        hosts,
        &cpu_ids,
        config.max_concurrency,
        false,
        config.end_time,
    )
    .context("failed to construct the scheduling policy")?;

    let round = RoundScheduler::new(policy, config.end_time);
    let runahead = Runahead::new(false, config.min_path_latency, None);
    let controller = Controller::new(round, runahead);

    let summary = controller.run();

    log::info!(
        "simulation finished: events_dropped_after_end={} events_faulted={}",
        summary.events_dropped_after_end,
        summary.events_faulted,
    );

    Ok(())
}

fn build_boot_task() -> Task {
    Task::new(|host| {
        log::info!("{} booted", host.name());
        Ok(())
    })
}

/// One CPU id per worker, round-robin across available CPUs (§4.3), or `None` for every worker
/// when pinning is disabled (the default: §9 leaves affinity pinning advisory).
fn cpu_ids_for(n_workers: u32, cpu_pinning: bool) -> Vec<Option<u32>> {
    if n_workers == 0 {
        return Vec::new();
    }
    if !cpu_pinning {
        return vec![None; n_workers as usize];
    }
    let n_cpus = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(1);
    (0..n_workers).map(|i| Some(i % n_cpus)).collect()
}

fn load_config_file(path: &str) -> anyhow::Result<ConfigFileOptions> {
    let reader: Box<dyn std::io::Read> = if path == "-" {
        Box::new(std::io::stdin())
    } else {
        Box::new(std::fs::File::open(path).context("could not open config file")?)
    };
    serde_yaml::from_reader(reader).context("could not parse configuration file as yaml")
}

fn render_schema(schema: &schemars::schema::RootSchema) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(schema)?)
}

/// Requests an orderly-as-possible shutdown on SIGINT/SIGTERM. The engine has no mid-round
/// cancellation (§1 Non-goals: no preemption of running events), so, matching the teacher's own
/// handler, this flushes the logger and exits rather than trying to unwind the controller loop.
fn install_signal_handler() -> anyhow::Result<()> {
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGTERM,
    ])?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            log::info!("received signal {signal}, flushing log and exiting");
            log::logger().flush();
            std::process::exit(1);
        }
    });
    Ok(())
}
