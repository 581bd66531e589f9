use std::str::FromStr;

use crate::error::LineError;
use crate::line::{EdgeTrigger, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    DirectionOut,
    DirectionIn,
    Drive(Level),
    Arm(EdgeTrigger),
    DisableIrq,
}

impl FromStr for Command {
    type Err = LineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "out" => Ok(Command::DirectionOut),
            "in" => Ok(Command::DirectionIn),
            "1" => Ok(Command::Drive(Level::High)),
            "0" => Ok(Command::Drive(Level::Low)),
            "rising" => Ok(Command::Arm(EdgeTrigger::Rising)),
            "falling" => Ok(Command::Arm(EdgeTrigger::Falling)),
            "disable-irq" => Ok(Command::DisableIrq),
            other => Err(LineError::InvalidCommand(other.to_string())),
        }
    }
}
