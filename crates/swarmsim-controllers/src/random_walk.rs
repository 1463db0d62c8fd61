//! Run-and-tumble random walk.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use swarmsim_core::{Controller, ControllerInput, ControllerOutput, MotorCommand};

/// Alternates straight runs with random-direction tumbles, the classic
/// space-covering gait for vibration-motor robots.
///
/// Phase lengths are drawn in controller steps. With the engine's default
/// schedule a robot executes roughly `tick_rate` steps per modeled second,
/// so the defaults give runs of one to four seconds at 32 ticks/s.
pub struct RandomWalk {
    rng: SmallRng,
    min_run: u32,
    max_run: u32,
    min_tumble: u32,
    max_tumble: u32,
    motor: MotorCommand,
    remaining: u32,
}

impl RandomWalk {
    /// Build a walker with the default phase ranges.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_phases(seed, 32, 128, 4, 32)
    }

    /// Build a walker with explicit run and tumble ranges (inclusive,
    /// in controller steps). Degenerate ranges are clamped to one step.
    #[must_use]
    pub fn with_phases(
        seed: u64,
        min_run: u32,
        max_run: u32,
        min_tumble: u32,
        max_tumble: u32,
    ) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            min_run: min_run.max(1),
            max_run: max_run.max(min_run.max(1)),
            min_tumble: min_tumble.max(1),
            max_tumble: max_tumble.max(min_tumble.max(1)),
            motor: MotorCommand::Stop,
            remaining: 0,
        }
    }

    fn begin_next_phase(&mut self) {
        if self.motor == MotorCommand::Straight {
            self.motor = if self.rng.random::<bool>() {
                MotorCommand::TurnLeft
            } else {
                MotorCommand::TurnRight
            };
            self.remaining = self.rng.random_range(self.min_tumble..=self.max_tumble);
        } else {
            self.motor = MotorCommand::Straight;
            self.remaining = self.rng.random_range(self.min_run..=self.max_run);
        }
    }
}

impl Controller for RandomWalk {
    fn kind(&self) -> &'static str {
        "swarmsim.random_walk"
    }

    fn step(&mut self, _input: &ControllerInput<'_>) -> ControllerOutput {
        if self.remaining == 0 {
            self.begin_next_phase();
        }
        self.remaining -= 1;
        ControllerOutput::silent(self.motor)
    }
}
