//! Gradient-climbing phototaxis.

use swarmsim_core::{Controller, ControllerInput, ControllerOutput, MotorCommand};

/// Climbs the light gradient with the edge-following trick used on real
/// kilobots: keep turning one way while the reading improves, switch the
/// turn direction when it has dropped for long enough.
///
/// A single dim sample is tolerated (`patience`) so pixel-boundary noise in
/// the sampled field does not cause direction thrash.
pub struct Phototaxis {
    best: u16,
    fading: u32,
    patience: u32,
    motor: MotorCommand,
}

impl Default for Phototaxis {
    fn default() -> Self {
        Self::new()
    }
}

impl Phototaxis {
    #[must_use]
    pub fn new() -> Self {
        Self::with_patience(2)
    }

    /// `patience` is how many consecutive worsening samples are tolerated
    /// before the turn direction flips.
    #[must_use]
    pub fn with_patience(patience: u32) -> Self {
        Self {
            best: 0,
            fading: 0,
            patience: patience.max(1),
            motor: MotorCommand::TurnLeft,
        }
    }

    fn flip(&mut self) {
        self.motor = match self.motor {
            MotorCommand::TurnRight => MotorCommand::TurnLeft,
            _ => MotorCommand::TurnRight,
        };
    }
}

impl Controller for Phototaxis {
    fn kind(&self) -> &'static str {
        "swarmsim.phototaxis"
    }

    fn step(&mut self, input: &ControllerInput<'_>) -> ControllerOutput {
        if input.light > self.best {
            self.best = input.light;
            self.fading = 0;
        } else if input.light < self.best {
            self.fading += 1;
            if self.fading >= self.patience {
                self.flip();
                self.best = input.light;
                self.fading = 0;
            }
        }
        ControllerOutput::silent(self.motor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_with(controller: &mut Phototaxis, light: u16) -> MotorCommand {
        controller
            .step(&ControllerInput {
                light,
                inbox: &[],
                motor: MotorCommand::Stop,
            })
            .motor
    }

    #[test]
    fn holds_direction_while_brightening() {
        let mut controller = Phototaxis::new();
        let first = step_with(&mut controller, 100);
        for light in [150, 200, 300, 512] {
            assert_eq!(step_with(&mut controller, light), first);
        }
    }

    #[test]
    fn flips_after_sustained_dimming() {
        let mut controller = Phototaxis::with_patience(2);
        let initial = step_with(&mut controller, 400);
        assert_eq!(step_with(&mut controller, 300), initial);
        let flipped = step_with(&mut controller, 250);
        assert_ne!(flipped, initial);
    }

    #[test]
    fn single_dim_sample_is_tolerated() {
        let mut controller = Phototaxis::with_patience(2);
        let initial = step_with(&mut controller, 400);
        assert_eq!(step_with(&mut controller, 390), initial);
        // Recovery resets the fade counter.
        assert_eq!(step_with(&mut controller, 410), initial);
        assert_eq!(step_with(&mut controller, 405), initial);
    }

    #[test]
    fn always_turns_and_never_transmits() {
        let mut controller = Phototaxis::new();
        for light in [0, 10, 5, 200, 100, 50] {
            let output = controller.step(&ControllerInput {
                light,
                inbox: &[],
                motor: MotorCommand::Stop,
            });
            assert!(matches!(
                output.motor,
                MotorCommand::TurnLeft | MotorCommand::TurnRight
            ));
            assert!(output.outgoing.is_none());
        }
    }
}
