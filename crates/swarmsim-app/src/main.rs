use anyhow::{Result, ensure};
use clap::Parser;
use swarmsim_controllers::{Beacon, Phototaxis, RandomWalk};
use swarmsim_core::{
    BasicBot, Controller, LightField, Pose, RobotId, SwarmConfig, TickEvents, World,
};
use tracing::info;

/// Headless Kilobot-style swarm simulation runner.
#[derive(Debug, Parser)]
#[command(name = "swarmsim", version, about)]
struct Args {
    /// Number of robots to place.
    #[arg(long, default_value_t = 120)]
    robots: u32,

    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 3_200)]
    ticks: u64,

    /// RNG seed; omit for an entropy-derived seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Square arena side length in mm.
    #[arg(long, default_value_t = 2_400.0)]
    arena: f32,

    /// Ticks between progress log lines.
    #[arg(long, default_value_t = 320)]
    log_interval: u64,

    /// Skip the gradient light pattern.
    #[arg(long)]
    dark: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    ensure!(args.robots > 0, "at least one robot is required");

    let mut world = bootstrap_world(&args)?;
    info!(
        robots = world.robot_count(),
        ticks = args.ticks,
        arena = args.arena,
        seed = ?args.seed,
        "starting swarm run"
    );

    let mut totals = RunTotals::default();
    for _ in 0..args.ticks {
        let events = world.step();
        totals.absorb(&events);
        if args.log_interval > 0 && events.tick.0.is_multiple_of(args.log_interval) {
            log_progress(&world, &events);
        }
    }

    let snapshot = world.snapshot();
    let mean_light = if snapshot.robots.is_empty() {
        0.0
    } else {
        snapshot
            .robots
            .iter()
            .map(|robot| f64::from(robot.sensed_light))
            .sum::<f64>()
            / snapshot.robots.len() as f64
    };
    info!(
        tick = snapshot.tick.0,
        time_s = snapshot.time,
        messages = totals.messages,
        controller_runs = totals.controller_runs,
        rejected_moves = totals.rejected,
        mean_light,
        "run complete"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[derive(Debug, Default)]
struct RunTotals {
    messages: u64,
    controller_runs: u64,
    rejected: u64,
}

impl RunTotals {
    fn absorb(&mut self, events: &TickEvents) {
        self.messages += events.messages_delivered as u64;
        self.controller_runs += events.controllers_run as u64;
        self.rejected += events.moves_rejected as u64;
    }
}

fn log_progress(world: &World, events: &TickEvents) {
    info!(
        tick = events.tick.0,
        time_s = world.time(),
        communicated = events.communicated,
        delivered = events.messages_delivered,
        controllers = events.controllers_run,
        rejected = events.moves_rejected,
        "tick"
    );
}

fn bootstrap_world(args: &Args) -> Result<World> {
    let config = SwarmConfig {
        arena_width: args.arena,
        arena_height: args.arena,
        rng_seed: args.seed,
        ..SwarmConfig::default()
    };
    let mut world = if args.dark {
        World::new(config)?
    } else {
        let light = gradient_field(256, 256)?;
        World::with_light_pattern(config, light)?
    };
    seed_robots(&mut world, args)?;
    Ok(world)
}

/// Radial gradient brightest at the arena center, the usual phototaxis
/// target pattern.
fn gradient_field(width: u32, height: u32) -> Result<LightField, swarmsim_core::WorldError> {
    let center_x = width as f32 / 2.0;
    let center_y = height as f32 / 2.0;
    let max_dist = (center_x * center_x + center_y * center_y).sqrt();
    let mut data = Vec::with_capacity((width as usize) * (height as usize));
    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 + 0.5 - center_x;
            let dy = y as f32 + 0.5 - center_y;
            let dist = (dx * dx + dy * dy).sqrt();
            let value = 255.0 * (1.0 - dist / max_dist);
            data.push(value.clamp(0.0, 255.0) as u8);
        }
    }
    LightField::new(width, height, data)
}

/// Place a loose grid of robots alternating random walkers and gradient
/// climbers, with one central beacon landmark.
fn seed_robots(world: &mut World, args: &Args) -> Result<()> {
    let seed = args.seed.unwrap_or(0x5117_A0B5);
    let margin = world.config().body_radius * 3.0;
    let (width, height) = world.dimensions();
    let columns = (args.robots as f32).sqrt().ceil() as u32;
    let rows = args.robots.div_ceil(columns);
    ensure!(
        columns as f32 * margin * 2.0 < width && rows as f32 * margin * 2.0 < height,
        "arena of {width}x{height} mm cannot hold {} robots",
        args.robots
    );
    let step_x = (width - 2.0 * margin) / columns as f32;
    let step_y = (height - 2.0 * margin) / rows as f32;

    let mut poses = Vec::with_capacity(args.robots as usize);
    for index in 0..args.robots {
        let col = index % columns;
        let row = index / columns;
        let controller: Box<dyn Controller> = if index % 2 == 0 {
            Box::new(RandomWalk::new(seed.wrapping_add(u64::from(index))))
        } else {
            Box::new(Phototaxis::new())
        };
        let pose = Pose::new(
            margin + (col as f32 + 0.5) * step_x,
            margin + (row as f32 + 0.5) * step_y,
            (index as f32) * 0.61,
        );
        let handle = BasicBot::new(RobotId(index + 1), pose, controller).into_handle();
        world.add_robot(&handle);
        poses.push(pose);
    }

    // The beacon sits on the corner between the central grid cells, the
    // point farthest from the surrounding robot centers.
    let beacon_pose = Pose::new(
        margin + (columns / 2) as f32 * step_x,
        margin + (rows / 2) as f32 * step_y,
        0.0,
    );
    let clearance = 2.0 * world.config().body_radius;
    ensure!(
        poses
            .iter()
            .all(|pose| pose.distance_to(&beacon_pose) >= clearance),
        "grid too dense to place the beacon landmark"
    );
    let beacon = BasicBot::new(
        RobotId(args.robots + 1),
        beacon_pose,
        Box::new(Beacon::new(args.robots + 1)),
    )
    .into_handle();
    world.add_robot(&beacon);
    Ok(())
}
