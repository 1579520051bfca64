#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that replays sandbox scripts through the Restraint Warden engine.

mod script;

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use restraint_warden_core::{Event, NearbyEntity, Timestamp};
use restraint_warden_engine::{Warden, WardenConfig};
use restraint_warden_sandbox::{Failures, SandboxHost};
use restraint_warden_store::{JsonFileBackend, MemoryBackend, RecordBackend};
use script::{parse_line, Directive, FailureKind};
use tracing_subscriber::EnvFilter;

/// Granularity of the clock when a script runs for a span of time.
const RUN_STEP: Duration = Duration::from_millis(50);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Sandbox driver for the Restraint Warden engine",
    long_about = None
)]
struct Args {
    /// Path to the TOML configuration (defaults apply when missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the JSON data file (kept in memory when omitted)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Script to replay (read from stdin when omitted)
    #[arg(long)]
    script: Option<PathBuf>,

    /// Identifier of the sandbox world
    #[arg(long, default_value = "sandbox")]
    world_id: String,

    /// Write the default configuration to this path and exit
    #[arg(long)]
    write_default_config: Option<PathBuf>,
}

/// Entry point for the Restraint Warden command-line interface.
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    if let Some(path) = &args.write_default_config {
        WardenConfig::default()
            .save(path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        println!("wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => WardenConfig::load(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?,
        None => WardenConfig::default(),
    };
    let backend: Box<dyn RecordBackend> = match &args.data {
        Some(path) => Box::new(JsonFileBackend::new(path)),
        None => Box::new(MemoryBackend::new()),
    };
    let source = read_script(args.script.as_deref())?;

    let mut session = Session {
        warden: Warden::new(config, backend, &args.world_id),
        host: SandboxHost::new(),
        now: Timestamp::default(),
        failures: Failures::default(),
    };
    for (index, line) in source.lines().enumerate() {
        let directive = parse_line(line)
            .with_context(|| format!("Script line {}: {}", index + 1, line.trim()))?;
        if let Some(directive) = directive {
            session.apply(directive);
        }
    }
    session.warden.shutdown(&mut session.host);

    Ok(())
}

fn read_script(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read script at {}", path.display())),
        None => io::read_to_string(io::stdin()).with_context(|| "Failed to read script from stdin"),
    }
}

struct Session {
    warden: Warden,
    host: SandboxHost,
    now: Timestamp,
    failures: Failures,
}

impl Session {
    fn apply(&mut self, directive: Directive) {
        match directive {
            Directive::Ground(height) => self.host.set_ground(height),
            Directive::Landmark { position, name } => self.host.add_landmark(&name, position),
            Directive::SafeArea { center, radius } => self.host.add_safe_area(center, radius),
            Directive::Obstacle { center, radius } => self.host.add_obstacle(center, radius),
            Directive::Structure {
                kind,
                position,
                prefab,
            } => self
                .host
                .add_structure(position, NearbyEntity::new(kind, prefab)),
            Directive::Spawn {
                actor,
                position,
                name,
            } => self.host.spawn_actor(actor, &name, position),
            Directive::Grant { actor, node } => self.host.grant(actor, &node),
            Directive::Revoke { actor, node } => self.host.revoke(actor, &node),
            Directive::Restrain(actor) => self.host.restrain(actor),
            Directive::Unrestrain(actor) => self.host.unrestrain(actor),
            Directive::Hood(actor) => self.host.hood(actor),
            Directive::Place { actor, position } => self.host.place(actor, position),
            Directive::Disconnect(actor) => {
                self.host.disconnect(actor);
                let events = self.warden.on_disconnect(actor, &mut self.host);
                self.print_events(&events);
            }
            Directive::Kill(actor) => {
                self.host.kill(actor);
                let events = self.warden.on_death(actor, &mut self.host);
                self.print_events(&events);
            }
            Directive::Fail(kind) => {
                self.failures = match kind {
                    None => Failures::default(),
                    Some(kind) => with_failure(self.failures, kind),
                };
                self.host.set_failures(self.failures);
            }
            Directive::At(seconds) => {
                self.now = self.now.max(timestamp(seconds));
                self.step();
            }
            Directive::Run(seconds) => {
                let until = self.now.saturating_add(duration(seconds));
                while self.now < until {
                    self.now = self.now.saturating_add(RUN_STEP).min(until);
                    self.step();
                }
            }
            Directive::Choose { actor, choice } => {
                let events = self.warden.record_choice(actor, choice, &mut self.host);
                self.print_events(&events);
            }
            Directive::Admin { caller, args } => {
                let args: Vec<&str> = args.iter().map(String::as_str).collect();
                let reply = self
                    .warden
                    .execute_admin(caller, &args, self.now, &mut self.host);
                for message in &reply.messages {
                    println!("[{}] {caller} > {message}", self.clock());
                }
                self.print_events(&reply.events);
            }
            Directive::ResetWorld(world_id) => self.warden.on_world_reset(&world_id),
        }
    }

    fn step(&mut self) {
        let events = self.warden.advance(self.now, &mut self.host);
        self.print_events(&events);
    }

    fn print_events(&self, events: &[Event]) {
        for event in events {
            println!("[{}] {event:?}", self.clock());
        }
    }

    fn clock(&self) -> String {
        format!("{:>9.3}", self.now.as_millis() as f64 / 1_000.0)
    }
}

fn with_failure(mut failures: Failures, kind: FailureKind) -> Failures {
    match kind {
        FailureKind::Teleport => failures.teleport = true,
        FailureKind::WritePosition => failures.write_position = true,
        FailureKind::Geometry => failures.geometry = true,
        FailureKind::RaycastMiss => failures.raycast_miss = true,
        FailureKind::Spawn => failures.spawn = true,
        FailureKind::StickyFlag => failures.sticky_flag = true,
    }
    failures
}

fn duration(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}

fn timestamp(seconds: f64) -> Timestamp {
    Timestamp::default().saturating_add(duration(seconds))
}
