//! Deterministic tick engine shared across the swarmsim workspace.
//!
//! The [`World`] advances in discrete, synchronized ticks. Each tick runs a
//! fixed phase pipeline: light sensing, periodic range-limited message
//! exchange, probabilistically gated controller execution, pure motion
//! integration, and collision resolution, followed by a single pose commit.
//! Every random draw comes from one world-owned, seedable RNG on the
//! sequential path, so a fixed seed and call sequence reproduce a run
//! bit-for-bit.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Number of payload bytes carried by a broadcast message (kilolib-sized).
pub const MESSAGE_PAYLOAD: usize = 9;

/// Light reading returned when no pattern is configured or a query falls
/// outside the arena.
pub const LIGHT_DEFAULT: u16 = 0;

const FULL_TURN: f32 = std::f32::consts::TAU;

/// Wrap an angle into `[0, 2π)`. Non-finite inputs collapse to 0.
fn wrap_heading(angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    let wrapped = angle.rem_euclid(FULL_TURN);
    // rem_euclid of a tiny negative can round up to the modulus itself.
    if wrapped >= FULL_TURN { 0.0 } else { wrapped }
}

/// High level simulation clock (ticks processed since construction).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The tick counter origin.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Stable robot identity used for reproducible collision tie-breaks.
///
/// Uniqueness across registered robots is the caller's contract; equal ids
/// fall back to registration order when ranking conflicting moves.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct RobotId(pub u32);

/// Robot position and orientation in arena coordinates (mm, origin at the
/// bottom-left corner). Heading is kept in `[0, 2π)`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub heading: f32,
}

impl Pose {
    /// Construct a pose, wrapping the heading into `[0, 2π)`.
    #[must_use]
    pub fn new(x: f32, y: f32, heading: f32) -> Self {
        Self {
            x,
            y,
            heading: wrap_heading(heading),
        }
    }

    /// Copy of this pose with the heading wrapped into `[0, 2π)`.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            heading: wrap_heading(self.heading),
            ..self
        }
    }

    /// Euclidean distance to another pose's position.
    #[must_use]
    pub fn distance_to(&self, other: &Pose) -> f32 {
        distance_sq(self, other).sqrt()
    }
}

#[inline]
fn distance_sq(a: &Pose, b: &Pose) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Discrete motor state of a two-vibration-motor robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MotorCommand {
    #[default]
    Stop,
    Straight,
    TurnLeft,
    TurnRight,
}

/// Fixed-size broadcast payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Message(pub [u8; MESSAGE_PAYLOAD]);

impl Message {
    /// Build a message whose first byte is `tag`, remaining bytes zero.
    #[must_use]
    pub fn tagged(tag: u8) -> Self {
        let mut data = [0_u8; MESSAGE_PAYLOAD];
        data[0] = tag;
        Self(data)
    }
}

/// A delivered message plus the measured distance (mm) between the two
/// robots at the time of the communication round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub message: Message,
    pub distance: f32,
}

/// Result of one controller execution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerOutput {
    /// Motor command to apply from this tick onward.
    pub motor: MotorCommand,
    /// Message to broadcast on subsequent communication rounds, replacing
    /// any previously pending one. `None` clears the transmit slot.
    pub outgoing: Option<Message>,
}

impl ControllerOutput {
    /// Keep driving with `motor` and transmit nothing new.
    #[must_use]
    pub const fn silent(motor: MotorCommand) -> Self {
        Self {
            motor,
            outgoing: None,
        }
    }
}

/// Capability surface a registered robot exposes to the engine.
///
/// The caller owns the robot (the world only clones the `Arc` handle) and
/// must not mutate it while a [`World::step`] call is in flight.
pub trait Robot: Send {
    /// Stable identity; see [`RobotId`].
    fn id(&self) -> RobotId;

    /// Currently committed pose.
    fn pose(&self) -> Pose;

    /// Commit a resolved pose. Called once per tick by the engine.
    fn set_pose(&mut self, pose: Pose);

    /// Current motor command. Read once at registration to seed the
    /// engine's view; afterwards controller runs are authoritative.
    fn motor(&self) -> MotorCommand;

    /// Execute one controller step with the light level sensed at the
    /// pre-move pose and the most recently delivered inbox.
    fn run_controller_step(&mut self, light: u16, inbox: &[ReceivedMessage]) -> ControllerOutput;
}

/// Shared handle under which robots are registered.
pub type RobotHandle = Arc<Mutex<dyn Robot>>;

/// Inputs handed to a [`Controller`] on each scheduled step.
#[derive(Debug, Clone, Copy)]
pub struct ControllerInput<'a> {
    /// Light level sensed at the robot's pre-move pose (10-bit scale).
    pub light: u16,
    /// Messages from the most recent communication round.
    pub inbox: &'a [ReceivedMessage],
    /// Motor command currently in effect.
    pub motor: MotorCommand,
}

/// Pluggable per-robot decision routine (the experiment supplies these).
pub trait Controller: Send {
    /// Static identifier of the controller implementation.
    fn kind(&self) -> &'static str;

    /// Produce the next motor command and optional broadcast.
    fn step(&mut self, input: &ControllerInput<'_>) -> ControllerOutput;
}

/// Ready-made robot driving a boxed [`Controller`] strategy.
pub struct BasicBot {
    id: RobotId,
    pose: Pose,
    motor: MotorCommand,
    controller: Box<dyn Controller>,
}

impl fmt::Debug for BasicBot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicBot")
            .field("id", &self.id)
            .field("pose", &self.pose)
            .field("motor", &self.motor)
            .field("controller", &self.controller.kind())
            .finish()
    }
}

impl BasicBot {
    /// Build a stopped robot at `pose` driven by `controller`.
    #[must_use]
    pub fn new(id: RobotId, pose: Pose, controller: Box<dyn Controller>) -> Self {
        Self {
            id,
            pose: pose.normalized(),
            motor: MotorCommand::Stop,
            controller,
        }
    }

    /// Wrap this robot in the shared handle form the world registers.
    #[must_use]
    pub fn into_handle(self) -> RobotHandle {
        Arc::new(Mutex::new(self))
    }

    /// Identifier of the attached controller.
    #[must_use]
    pub fn controller_kind(&self) -> &'static str {
        self.controller.kind()
    }
}

impl Robot for BasicBot {
    fn id(&self) -> RobotId {
        self.id
    }

    fn pose(&self) -> Pose {
        self.pose
    }

    fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    fn motor(&self) -> MotorCommand {
        self.motor
    }

    fn run_controller_step(&mut self, light: u16, inbox: &[ReceivedMessage]) -> ControllerOutput {
        let output = self.controller.step(&ControllerInput {
            light,
            inbox,
            motor: self.motor,
        });
        self.motor = output.motor;
        output
    }
}

/// Errors raised when constructing world state.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Indicates an unusable light pattern grid.
    #[error("invalid light pattern: {0}")]
    InvalidLightPattern(&'static str),
}

/// Static configuration for a swarm world. Immutable once a [`World`] has
/// been constructed from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwarmConfig {
    /// Arena width in mm.
    pub arena_width: f32,
    /// Arena height in mm.
    pub arena_height: f32,
    /// Simulation ticks per second of modeled time.
    pub tick_rate: u16,
    /// Ticks between communication rounds (1 means every tick).
    pub comm_period: u32,
    /// Maximum robot-to-robot broadcast distance in mm.
    pub comm_range: f32,
    /// Per-robot, per-tick probability that the controller executes,
    /// modeling microcontroller loop jitter.
    pub control_execute_probability: f64,
    /// Robot body circle radius in mm.
    pub body_radius: f32,
    /// Forward speed in mm/s while driving straight.
    pub linear_speed: f32,
    /// Rotation speed in rad/s while turning.
    pub angular_speed: f32,
    /// Fraction of `linear_speed` retained while turning.
    pub turn_advance_ratio: f32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            arena_width: 2_400.0,
            arena_height: 2_400.0,
            tick_rate: 32,
            comm_period: 3,
            comm_range: 96.0,
            control_execute_probability: 0.99,
            body_radius: 16.0,
            linear_speed: 10.0,
            angular_speed: std::f32::consts::FRAC_PI_4,
            turn_advance_ratio: 0.5,
            rng_seed: None,
        }
    }
}

impl SwarmConfig {
    /// Validate every constructor-time constraint.
    fn validate(&self) -> Result<(), WorldError> {
        if !(self.arena_width.is_finite() && self.arena_width > 0.0)
            || !(self.arena_height.is_finite() && self.arena_height > 0.0)
        {
            return Err(WorldError::InvalidConfig(
                "arena dimensions must be positive and finite",
            ));
        }
        if self.tick_rate == 0 {
            return Err(WorldError::InvalidConfig("tick_rate must be positive"));
        }
        if self.comm_period == 0 {
            return Err(WorldError::InvalidConfig("comm_period must be at least 1"));
        }
        if !(self.comm_range.is_finite() && self.comm_range > 0.0) {
            return Err(WorldError::InvalidConfig("comm_range must be positive"));
        }
        if !(0.0..=1.0).contains(&self.control_execute_probability) {
            return Err(WorldError::InvalidConfig(
                "control_execute_probability must be within [0, 1]",
            ));
        }
        if !(self.body_radius.is_finite() && self.body_radius > 0.0) {
            return Err(WorldError::InvalidConfig("body_radius must be positive"));
        }
        if 2.0 * self.body_radius > self.arena_width.min(self.arena_height) {
            return Err(WorldError::InvalidConfig(
                "robot body must fit within the arena",
            ));
        }
        if !(self.linear_speed.is_finite() && self.linear_speed >= 0.0)
            || !(self.angular_speed.is_finite() && self.angular_speed >= 0.0)
        {
            return Err(WorldError::InvalidConfig(
                "speeds must be non-negative and finite",
            ));
        }
        if !(0.0..=1.0).contains(&self.turn_advance_ratio) {
            return Err(WorldError::InvalidConfig(
                "turn_advance_ratio must be within [0, 1]",
            ));
        }
        Ok(())
    }

    /// Duration of one tick in seconds.
    #[must_use]
    pub fn tick_delta(&self) -> f32 {
        1.0 / f32::from(self.tick_rate)
    }

    /// Returns the configured RNG, generating a seed from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}

/// Background light pattern: `width × height` grid of 8-bit intensities.
///
/// Row 0 is the bottom row so the grid shares the arena's bottom-left
/// origin. Sampling scales the grid to the arena extents and reads the
/// nearest pixel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LightField {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl LightField {
    /// Construct a field from row-major bottom-up pixel data.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, WorldError> {
        if width == 0 || height == 0 {
            return Err(WorldError::InvalidLightPattern(
                "light pattern dimensions must be non-zero",
            ));
        }
        if data.len() != (width as usize) * (height as usize) {
            return Err(WorldError::InvalidLightPattern(
                "light pattern data length must equal width * height",
            ));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Construct a field filled with a single intensity.
    pub fn uniform(width: u32, height: u32, value: u8) -> Result<Self, WorldError> {
        let len = (width as usize) * (height as usize);
        Self::new(width, height, vec![value; len])
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Sample the 10-bit light level at arena coordinate `(x, y)`.
    ///
    /// Pure function: the nearest pixel of the grid scaled to the arena
    /// extents, rescaled from the 8-bit source onto the kilobot API's
    /// 10-bit range (`value * 4`). Queries outside
    /// `[0, arena_width) × [0, arena_height)` return [`LIGHT_DEFAULT`].
    #[must_use]
    pub fn sample(&self, x: f32, y: f32, arena_width: f32, arena_height: f32) -> u16 {
        if !(0.0..arena_width).contains(&x) || !(0.0..arena_height).contains(&y) {
            return LIGHT_DEFAULT;
        }
        let px = (((x / arena_width) * self.width as f32) as u32).min(self.width - 1);
        let py = (((y / arena_height) * self.height as f32) as u32).min(self.height - 1);
        let idx = (py as usize) * (self.width as usize) + (px as usize);
        u16::from(self.data[idx]) << 2
    }
}

/// Engine-side mailbox and actuation state tracked per registered robot.
#[derive(Debug, Clone, Default)]
struct RobotRuntime {
    motor: MotorCommand,
    outbox: Option<Message>,
    inbox: Vec<ReceivedMessage>,
    sensed: u16,
}

impl RobotRuntime {
    fn new(motor: MotorCommand) -> Self {
        Self {
            motor,
            ..Self::default()
        }
    }
}

/// Events emitted after processing a world tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TickEvents {
    /// Tick counter value after the step.
    pub tick: Tick,
    /// Whether a communication round ran this tick.
    pub communicated: bool,
    /// Number of messages delivered this tick.
    pub messages_delivered: usize,
    /// Number of controllers that executed this tick.
    pub controllers_run: usize,
    /// Number of attempted moves vetoed by collision or bounds checks.
    pub moves_rejected: usize,
}

/// Per-robot view captured for loggers and renderers polling the world.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RobotSnapshot {
    pub id: RobotId,
    pub pose: Pose,
    pub motor: MotorCommand,
    pub sensed_light: u16,
}

/// Read-only world view polled by external collaborators after a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldSnapshot {
    pub tick: Tick,
    pub time: f64,
    pub robots: Vec<RobotSnapshot>,
}

/// Lock a robot handle, recovering from a poisoned mutex so a panicking
/// controller cannot wedge the arena.
fn lock_robot(handle: &RobotHandle) -> MutexGuard<'_, dyn Robot + 'static> {
    match handle.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Pure kinematic step: map a committed pose and motor command to the
/// candidate pose one tick later. Nothing is committed here; all candidates
/// are produced before collision resolution sees any of them.
#[must_use]
pub fn integrate_motion(pose: Pose, motor: MotorCommand, config: &SwarmConfig) -> Pose {
    let dt = config.tick_delta();
    match motor {
        MotorCommand::Stop => pose,
        MotorCommand::Straight => {
            let step = config.linear_speed * dt;
            Pose {
                x: pose.x + pose.heading.cos() * step,
                y: pose.y + pose.heading.sin() * step,
                heading: pose.heading,
            }
        }
        MotorCommand::TurnLeft | MotorCommand::TurnRight => {
            let swing = config.angular_speed * dt;
            let heading = if motor == MotorCommand::TurnLeft {
                wrap_heading(pose.heading + swing)
            } else {
                wrap_heading(pose.heading - swing)
            };
            let step = config.linear_speed * config.turn_advance_ratio * dt;
            Pose {
                x: pose.x + heading.cos() * step,
                y: pose.y + heading.sin() * step,
                heading,
            }
        }
    }
}

fn pose_in_bounds(pose: &Pose, radius: f32, arena_width: f32, arena_height: f32) -> bool {
    pose.x >= radius
        && pose.x <= arena_width - radius
        && pose.y >= radius
        && pose.y <= arena_height - radius
}

/// Accept or veto every candidate pose, in ascending `(id, index)` order.
///
/// A candidate is accepted only when its body circle stays inside the arena
/// and keeps at least two body radii of center distance from every other
/// robot's resolved-or-previous pose. Vetoed robots keep their previous
/// pose. Starting from an overlap-free committed state this cannot produce
/// an overlapping or out-of-bounds committed state: earlier robots were
/// checked against this robot's previous pose, later robots will be checked
/// against whatever this robot resolved to.
fn resolve_collisions(
    previous: &[Pose],
    candidates: &[Pose],
    ids: &[RobotId],
    config: &SwarmConfig,
) -> (Vec<Pose>, usize) {
    debug_assert_eq!(previous.len(), candidates.len());
    debug_assert_eq!(previous.len(), ids.len());

    let count = previous.len();
    let min_distance = 2.0 * config.body_radius;
    let min_distance_sq = min_distance * min_distance;

    let mut order: Vec<usize> = (0..count).collect();
    order.sort_by_key(|&idx| (ids[idx], idx));

    let mut resolved: Vec<Pose> = previous.to_vec();
    let mut rejected = 0_usize;

    for &idx in &order {
        let candidate = candidates[idx];
        if candidate == previous[idx] {
            continue;
        }
        let mut accepted = pose_in_bounds(
            &candidate,
            config.body_radius,
            config.arena_width,
            config.arena_height,
        );
        if accepted {
            for other in 0..count {
                if other == idx {
                    continue;
                }
                if distance_sq(&candidate, &resolved[other]) < min_distance_sq {
                    accepted = false;
                    break;
                }
            }
        }
        if accepted {
            resolved[idx] = candidate;
        } else {
            rejected += 1;
        }
    }

    (resolved, rejected)
}

/// Arena of registered robots advanced by a deterministic tick pipeline.
pub struct World {
    config: SwarmConfig,
    tick: Tick,
    rng: SmallRng,
    robots: Vec<RobotHandle>,
    runtime: Vec<RobotRuntime>,
    light: Option<LightField>,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("robot_count", &self.robots.len())
            .field("has_light_pattern", &self.light.is_some())
            .finish()
    }
}

impl World {
    /// Instantiate a world from the supplied configuration, without a light
    /// pattern. Fails fast on invalid configuration; the world is never
    /// partially constructed.
    pub fn new(config: SwarmConfig) -> Result<Self, WorldError> {
        config.validate()?;
        let rng = config.seeded_rng();
        Ok(Self {
            config,
            tick: Tick::zero(),
            rng,
            robots: Vec::new(),
            runtime: Vec::new(),
            light: None,
        })
    }

    /// Instantiate a world with a background light pattern.
    pub fn with_light_pattern(config: SwarmConfig, light: LightField) -> Result<Self, WorldError> {
        let mut world = Self::new(config)?;
        world.light = Some(light);
        Ok(world)
    }

    /// Immutable access to the configuration.
    #[must_use]
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Ticks per second of modeled time.
    #[must_use]
    pub const fn tick_rate(&self) -> u16 {
        self.config.tick_rate
    }

    /// Elapsed modeled time in seconds, exactly `tick / tick_rate`.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.tick.0 as f64 / f64::from(self.config.tick_rate)
    }

    /// Arena `(width, height)` in mm.
    #[must_use]
    pub const fn dimensions(&self) -> (f32, f32) {
        (self.config.arena_width, self.config.arena_height)
    }

    /// Registered robot handles, in registration order.
    #[must_use]
    pub fn robots(&self) -> &[RobotHandle] {
        &self.robots
    }

    /// Number of registered robots.
    #[must_use]
    pub fn robot_count(&self) -> usize {
        self.robots.len()
    }

    /// Whether a background light pattern is configured.
    #[must_use]
    pub const fn has_light_pattern(&self) -> bool {
        self.light.is_some()
    }

    /// The configured light pattern, if any.
    #[must_use]
    pub fn light_pattern(&self) -> Option<&LightField> {
        self.light.as_ref()
    }

    /// Replace the background light pattern.
    pub fn set_light_pattern(&mut self, light: LightField) {
        self.light = Some(light);
    }

    /// Sample the 10-bit light level at arena coordinate `(x, y)`, or
    /// [`LIGHT_DEFAULT`] when no pattern is configured or the query falls
    /// outside the arena.
    #[must_use]
    pub fn sample_light(&self, x: f32, y: f32) -> u16 {
        match &self.light {
            Some(field) => field.sample(x, y, self.config.arena_width, self.config.arena_height),
            None => LIGHT_DEFAULT,
        }
    }

    /// Register a robot. Re-adding an already registered robot (the same
    /// allocation) is a no-op.
    pub fn add_robot(&mut self, robot: &RobotHandle) {
        if self.robots.iter().any(|known| Arc::ptr_eq(known, robot)) {
            return;
        }
        let motor = lock_robot(robot).motor();
        self.robots.push(Arc::clone(robot));
        self.runtime.push(RobotRuntime::new(motor));
    }

    /// Deregister a robot. Removing an unregistered robot is a no-op; the
    /// robot itself is never destroyed, only the world's handle is dropped.
    pub fn remove_robot(&mut self, robot: &RobotHandle) {
        if let Some(position) = self
            .robots
            .iter()
            .position(|known| Arc::ptr_eq(known, robot))
        {
            self.robots.remove(position);
            self.runtime.remove(position);
        }
    }

    /// Capture per-robot views for external loggers and renderers.
    #[must_use]
    pub fn robot_snapshots(&self) -> Vec<RobotSnapshot> {
        self.robots
            .iter()
            .zip(&self.runtime)
            .map(|(handle, runtime)| {
                let robot = lock_robot(handle);
                RobotSnapshot {
                    id: robot.id(),
                    pose: robot.pose(),
                    motor: runtime.motor,
                    sensed_light: runtime.sensed,
                }
            })
            .collect()
    }

    /// Bundle tick, time, and robot views into one read-only snapshot.
    #[must_use]
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot {
            tick: self.tick,
            time: self.time(),
            robots: self.robot_snapshots(),
        }
    }

    /// Advance exactly one tick through the fixed phase pipeline:
    /// sense, communicate (on eligible ticks), schedule and run
    /// controllers, integrate motion, resolve collisions, commit.
    pub fn step(&mut self) -> TickEvents {
        let (poses, ids) = self.snapshot_poses();

        self.phase_sense(&poses);
        let comm_round = self.tick.0.is_multiple_of(u64::from(self.config.comm_period));
        let messages_delivered = if comm_round {
            self.phase_communicate(&poses)
        } else {
            0
        };
        let controllers_run = self.phase_controllers();
        let candidates = self.phase_integrate(&poses);
        let (resolved, moves_rejected) =
            resolve_collisions(&poses, &candidates, &ids, &self.config);
        self.phase_commit(&resolved);

        self.tick = self.tick.next();
        TickEvents {
            tick: self.tick,
            communicated: comm_round,
            messages_delivered,
            controllers_run,
            moves_rejected,
        }
    }

    /// One locked pass capturing every robot's committed pose and identity.
    fn snapshot_poses(&self) -> (Vec<Pose>, Vec<RobotId>) {
        let mut poses = Vec::with_capacity(self.robots.len());
        let mut ids = Vec::with_capacity(self.robots.len());
        for handle in &self.robots {
            let robot = lock_robot(handle);
            poses.push(robot.pose().normalized());
            ids.push(robot.id());
        }
        (poses, ids)
    }

    /// Every robot senses the light field at its pre-move pose.
    fn phase_sense(&mut self, poses: &[Pose]) {
        let readings: Vec<u16> = {
            let world: &World = &*self;
            poses
                .par_iter()
                .map(|pose| world.sample_light(pose.x, pose.y))
                .collect()
        };
        for (runtime, reading) in self.runtime.iter_mut().zip(readings) {
            runtime.sensed = reading;
        }
    }

    /// All-pairs range-limited broadcast exchange. O(n²), deliberately:
    /// at the target scale (tens to low hundreds of robots) the dense
    /// sweep is cheaper and simpler than maintaining a spatial index,
    /// and its pair ordering is trivially deterministic.
    fn phase_communicate(&mut self, poses: &[Pose]) -> usize {
        let count = self.robots.len();
        let range_sq = self.config.comm_range * self.config.comm_range;
        let mut inboxes: Vec<Vec<ReceivedMessage>> = vec![Vec::new(); count];
        let mut delivered = 0_usize;

        for i in 0..count {
            for j in (i + 1)..count {
                let dist_sq = distance_sq(&poses[i], &poses[j]);
                if dist_sq > range_sq {
                    continue;
                }
                let distance = dist_sq.sqrt();
                if let Some(message) = self.runtime[i].outbox {
                    inboxes[j].push(ReceivedMessage { message, distance });
                    delivered += 1;
                }
                if let Some(message) = self.runtime[j].outbox {
                    inboxes[i].push(ReceivedMessage { message, distance });
                    delivered += 1;
                }
            }
        }

        // Full replacement each round, even with an empty set: a radio that
        // heard nothing has an empty neighbor table.
        for (runtime, inbox) in self.runtime.iter_mut().zip(inboxes) {
            runtime.inbox = inbox;
        }
        delivered
    }

    /// Bernoulli-gate and run controllers. Draws happen for every robot in
    /// registration order whether or not the controller runs, keeping the
    /// RNG call sequence fixed for a given seed.
    fn phase_controllers(&mut self) -> usize {
        let gate = self.config.control_execute_probability;
        let mut executed = 0_usize;
        for idx in 0..self.robots.len() {
            let scheduled = self.rng.random::<f64>() < gate;
            if !scheduled {
                continue;
            }
            let output = {
                let runtime = &self.runtime[idx];
                let mut robot = lock_robot(&self.robots[idx]);
                robot.run_controller_step(runtime.sensed, &runtime.inbox)
            };
            let runtime = &mut self.runtime[idx];
            runtime.motor = output.motor;
            runtime.outbox = output.outgoing;
            executed += 1;
        }
        executed
    }

    /// Compute every candidate pose from the committed snapshot. Pure and
    /// independent per robot, so the map runs on the worker pool.
    fn phase_integrate(&self, poses: &[Pose]) -> Vec<Pose> {
        let config = &self.config;
        let runtime = &self.runtime;
        poses
            .par_iter()
            .enumerate()
            .map(|(idx, pose)| integrate_motion(*pose, runtime[idx].motor, config))
            .collect()
    }

    /// Commit resolved poses back into the robots.
    fn phase_commit(&mut self, resolved: &[Pose]) {
        for (handle, pose) in self.robots.iter().zip(resolved) {
            let mut robot = lock_robot(handle);
            robot.set_pose(pose.normalized());
        }
    }
}
