use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vessel_common::{Rgba, Role, SimConfig};
use vessel_ledger::{Substance, SubstanceCatalog, SubstanceId, SubstanceLedger, discard, transfer};
use vessel_replicate::{
    ContainerRef, ContainerRegistry, DisplayMirror, DisplayProfile, LedgerCommand,
    LoopbackTransport, ObserverId, ReplicationBridge, encode_command,
};
use vessel_spill::{HitTarget, SpillController, SpillEvent, SpillInput, route_particle_hits};

#[derive(Parser)]
#[command(name = "vessel-cli", about = "Scenario runner for substance containers")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML or JSON config file overriding display and spill tunables
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print crate versions and the effective config
    Info,
    /// Move moles of water between two containers, then spill some on the floor
    Transfer {
        /// Moles of water in the source container
        #[arg(short, long, default_value = "10")]
        moles: f32,
        /// Moles to transfer
        #[arg(short, long, default_value = "4")]
        amount: f32,
        /// Capacity of both containers in volume units
        #[arg(long, default_value = "20")]
        capacity: f32,
        /// Moles to discard from the source afterwards
        #[arg(short, long, default_value = "100")]
        discard: f32,
    },
    /// Tilt an open cup at a fixed angle and pour it out step by step
    Spill {
        /// Starting fill as a fraction of capacity
        #[arg(short, long, default_value = "0.8")]
        fill: f32,
        /// Tilt angle in degrees from upright
        #[arg(short, long, default_value = "75")]
        tilt: f32,
        /// Simulated duration in seconds
        #[arg(short, long, default_value = "10")]
        seconds: f32,
        /// Fixed time step in seconds
        #[arg(long, default_value = "0.02")]
        dt: f32,
        /// Pour into a bowl instead of onto the floor
        #[arg(long)]
        into_bowl: bool,
    },
    /// Replicate a mixed container to an observer and print what it displays
    Snapshot {
        /// Print the received snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => SimConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SimConfig::default(),
    };
    tracing::debug!(?config, "effective config");

    match cli.command {
        Commands::Info => {
            println!("vessel-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("common: {}", vessel_common::crate_info());
            println!("ledger: {}", vessel_ledger::crate_info());
            println!("replicate: {}", vessel_replicate::crate_info());
            println!("spill: {}", vessel_spill::crate_info());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Transfer {
            moles,
            amount,
            capacity,
            discard: discard_amount,
        } => run_transfer(moles, amount, capacity, discard_amount)?,
        Commands::Spill {
            fill,
            tilt,
            seconds,
            dt,
            into_bowl,
        } => run_spill(&config, fill, tilt, seconds, dt, into_bowl)?,
        Commands::Snapshot { json } => run_snapshot(&config, json)?,
    }

    Ok(())
}

fn demo_catalog() -> anyhow::Result<SubstanceCatalog> {
    let mut catalog = SubstanceCatalog::new();
    catalog.register(Substance::new(
        SubstanceId(1),
        "water",
        Rgba::rgb(0.25, 0.45, 0.95),
        1.0,
    ))?;
    catalog.register(Substance::new(
        SubstanceId(2),
        "orange juice",
        Rgba::rgb(1.0, 0.6, 0.1),
        1.2,
    ))?;
    Ok(catalog)
}

fn water(catalog: &SubstanceCatalog) -> anyhow::Result<Arc<Substance>> {
    Ok(catalog.get(SubstanceId(1))?)
}

fn run_transfer(moles: f32, amount: f32, capacity: f32, discard_amount: f32) -> anyhow::Result<()> {
    let catalog = demo_catalog()?;
    let mut src = SubstanceLedger::with_contents(capacity, [(water(&catalog)?, moles)])?;
    let mut dst = SubstanceLedger::new(capacity)?;
    println!(
        "source: {:.3} mol, volume {:.3}/{:.3}",
        src.total_moles(),
        src.current_volume(),
        src.capacity_volume()
    );

    let system_before = src.total_moles() + dst.total_moles();
    let moved = transfer(Role::Server, &mut src, &mut dst, amount)?;
    println!(
        "transfer({amount}) moved {moved:.3} mol -> source {:.3}, destination {:.3}",
        src.total_moles(),
        dst.total_moles()
    );
    let system_mid = src.total_moles() + dst.total_moles();
    println!(
        "conservation: {}",
        if (system_before - system_mid).abs() < 1e-4 {
            "OK"
        } else {
            "MISMATCH"
        }
    );

    // A client may not touch the ledger directly.
    if let Err(err) = src.remove_moles(Role::Client, 1.0) {
        println!("client removal rejected: {err}");
    }

    let removed = discard(Role::Server, &mut src, discard_amount)?;
    println!(
        "discard({discard_amount}) removed {removed:.3} mol; system total {:.3} -> {:.3}",
        system_mid,
        src.total_moles() + dst.total_moles()
    );
    Ok(())
}

fn run_spill(
    config: &SimConfig,
    fill: f32,
    tilt: f32,
    seconds: f32,
    dt: f32,
    into_bowl: bool,
) -> anyhow::Result<()> {
    anyhow::ensure!(dt > 0.0, "dt must be positive");
    let catalog = demo_catalog()?;
    let capacity = 5.0;
    let mut cup = SubstanceLedger::with_contents(capacity, [(water(&catalog)?, capacity * fill)])?;
    let mut bowl = SubstanceLedger::new(20.0)?;
    let mut controller = SpillController::new(config.spill.clone());

    let steps = (seconds / dt).ceil() as u64;
    let mut emitted = 0u64;
    let mut poured = 0.0f32;
    for step in 0..steps {
        let input = SpillInput {
            tilt_degrees: tilt,
            lidded: false,
            relative_volume: cup.relative_volume(),
        };
        match controller.step(input, dt)? {
            Some(SpillEvent::Started) => println!("t={:.2}s spill started", step as f32 * dt),
            Some(SpillEvent::Stopped) => {
                println!("t={:.2}s spill stopped", step as f32 * dt);
                break;
            }
            Some(SpillEvent::Emit { .. }) => {
                emitted += 1;
                let target = if into_bowl {
                    HitTarget::Container(&mut bowl)
                } else {
                    HitTarget::Surface
                };
                let tally = route_particle_hits(
                    Role::Server,
                    &mut cup,
                    target,
                    1,
                    config.spill.particle_moles,
                )?;
                poured += tally.total();
            }
            None => {}
        }
    }

    println!(
        "emitted {emitted} particles, poured {poured:.3} mol; cup at {:.1}%, bowl holds {:.3} mol",
        cup.relative_volume() * 100.0,
        bowl.total_moles()
    );
    Ok(())
}

fn run_snapshot(config: &SimConfig, json: bool) -> anyhow::Result<()> {
    let catalog = demo_catalog()?;
    let juice = catalog.get(SubstanceId(2))?;
    let jug_ref = ContainerRef::new(1, 0);
    let glass_ref = ContainerRef::new(2, 0);

    let mut registry = ContainerRegistry::server();
    registry.insert(
        jug_ref,
        SubstanceLedger::with_contents(10.0, [(water(&catalog)?, 4.0), (juice, 2.0)])?,
    );
    registry.insert(glass_ref, SubstanceLedger::new(4.0)?);

    let mut transport = LoopbackTransport::new();
    let observer = ObserverId(1);
    let glass = registry
        .get_mut(glass_ref)
        .context("glass was just registered")?;
    let mut bridge = ReplicationBridge::new(
        glass_ref,
        glass,
        DisplayProfile::default(),
        config.display.clone(),
    );
    bridge.connect_observer(observer, glass, &mut transport)?;
    bridge.initialize(glass, &mut transport)?;

    // The client asks the server to pour; the server routes the command.
    let frame = encode_command(&LedgerCommand::TransferMoles {
        source: jug_ref,
        destination: glass_ref,
        amount: 3.0,
    })?;
    let moved = registry.apply_frame(&frame)?;
    println!("poured {moved:.3} mol into glass {glass_ref}");

    let glass = registry
        .get_mut(glass_ref)
        .context("glass was just registered")?;
    bridge.sync(glass, &mut transport)?;

    let mut mirror = DisplayMirror::new(glass_ref, config.display.clone());
    for frame in transport.take(observer) {
        mirror.apply_frame(&frame)?;
    }
    for _ in 0..60 {
        mirror.advance(1.0 / 60.0);
    }

    let snapshot = mirror
        .snapshot()
        .context("observer received no display update")?;
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
    } else {
        println!(
            "glass: fill={:.3} tint=({:.2}, {:.2}, {:.2}) shown={:.3} shader={:.3}",
            snapshot.fill_fraction,
            snapshot.tint.r,
            snapshot.tint.g,
            snapshot.tint.b,
            mirror.displayed_fill(),
            mirror.shader_fill()
        );
    }
    bridge.detach(glass)?;
    Ok(())
}
