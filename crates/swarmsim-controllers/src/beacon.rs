//! Stationary broadcast beacon.

use swarmsim_core::{
    Controller, ControllerInput, ControllerOutput, MESSAGE_PAYLOAD, Message, MotorCommand,
};

/// Parked robot that broadcasts its identity every communication round.
///
/// Useful as a landmark for localization experiments: neighbors receive the
/// beacon's payload together with the measured distance.
pub struct Beacon {
    message: Message,
}

impl Beacon {
    /// Beacon carrying `ident` in the first payload bytes (little endian).
    #[must_use]
    pub fn new(ident: u32) -> Self {
        let mut data = [0_u8; MESSAGE_PAYLOAD];
        data[..4].copy_from_slice(&ident.to_le_bytes());
        Self {
            message: Message(data),
        }
    }

    /// Beacon carrying an arbitrary payload.
    #[must_use]
    pub const fn with_message(message: Message) -> Self {
        Self { message }
    }

    /// Read an identity back out of a beacon payload.
    #[must_use]
    pub fn ident_of(message: &Message) -> u32 {
        let mut bytes = [0_u8; 4];
        bytes.copy_from_slice(&message.0[..4]);
        u32::from_le_bytes(bytes)
    }
}

impl Controller for Beacon {
    fn kind(&self) -> &'static str {
        "swarmsim.beacon"
    }

    fn step(&mut self, _input: &ControllerInput<'_>) -> ControllerOutput {
        ControllerOutput {
            motor: MotorCommand::Stop,
            outgoing: Some(self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcasts_identity_and_stays_parked() {
        let mut beacon = Beacon::new(0xDEAD_BEEF);
        let output = beacon.step(&ControllerInput {
            light: 0,
            inbox: &[],
            motor: MotorCommand::Stop,
        });
        assert_eq!(output.motor, MotorCommand::Stop);
        let message = output.outgoing.expect("beacon payload");
        assert_eq!(Beacon::ident_of(&message), 0xDEAD_BEEF);
    }

    #[test]
    fn custom_payload_passes_through() {
        let message = Message::tagged(0x42);
        let mut beacon = Beacon::with_message(message);
        let output = beacon.step(&ControllerInput {
            light: 0,
            inbox: &[],
            motor: MotorCommand::Stop,
        });
        assert_eq!(output.outgoing, Some(message));
    }
}
