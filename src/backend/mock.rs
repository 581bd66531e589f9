use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};

use crate::error::LineError;
use crate::interrupt::EdgeSink;
use crate::line::{Direction, EdgeTrigger, Level};
use crate::registry::GpioBackend;

#[derive(Debug, Default)]
pub struct MockBackend {
    lines: RwLock<HashMap<u32, Mutex<MockLineState>>>, // keyed by line number
    claim_failures: parking_lot::Mutex<HashSet<u32>>,
    install_failures: parking_lot::Mutex<HashSet<u32>>,
}

#[derive(Debug)]
struct MockLineState {
    direction: Direction,
    driven: Level,
    sensed: Level,
    handler: Option<(EdgeTrigger, EdgeSink)>,
}

impl Default for MockLineState {
    fn default() -> Self {
        Self {
            direction: Direction::Output,
            driven: Level::Low,
            sensed: Level::Low,
            handler: None,
        }
    }
}

impl MockBackend {
    pub fn fail_claim(&self, line: u32) {
        self.claim_failures.lock().insert(line);
    }

    pub fn fail_edge_install(&self, line: u32) {
        self.install_failures.lock().insert(line);
    }

    pub fn is_claimed(&self, line: u32) -> Result<bool, LineError> {
        let lines = self
            .lines
            .read()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        Ok(lines.contains_key(&line))
    }

    pub fn handler_installed(&self, line: u32) -> Result<bool, LineError> {
        let lines = self
            .lines
            .read()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        let entry = lines
            .get(&line)
            .ok_or_else(|| LineError::Hardware(format!("line {line} not claimed")))?;
        let state = entry
            .lock()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        Ok(state.handler.is_some())
    }

    // Simulates an external level change on the line; fires the installed
    // edge handler when the transition matches its trigger.
    pub fn set_sensed(&self, line: u32, level: Level) -> Result<(), LineError> {
        let lines = self
            .lines
            .read()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        let entry = lines
            .get(&line)
            .ok_or_else(|| LineError::Hardware(format!("line {line} not claimed")))?;
        let mut state = entry
            .lock()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;

        let previous = state.sensed;
        state.sensed = level;

        let observed = match (previous, level) {
            (Level::Low, Level::High) => EdgeTrigger::Rising,
            (Level::High, Level::Low) => EdgeTrigger::Falling,
            _ => return Ok(()),
        };
        if let Some((trigger, sink)) = &state.handler
            && *trigger == observed
        {
            sink.dispatch(line, observed);
        }
        Ok(())
    }
}

impl GpioBackend for MockBackend {
    fn claim(&self, line: u32) -> Result<(), LineError> {
        if self.claim_failures.lock().contains(&line) {
            return Err(LineError::Hardware(format!("claim refused for line {line}")));
        }

        let mut lines = self
            .lines
            .write()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        if lines.contains_key(&line) {
            return Err(LineError::Hardware(format!("line {line} already claimed")));
        }
        lines.insert(line, Mutex::new(MockLineState::default()));
        Ok(())
    }

    fn set_output(&self, line: u32, level: Level) -> Result<(), LineError> {
        let lines = self
            .lines
            .read()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        let entry = lines
            .get(&line)
            .ok_or_else(|| LineError::Hardware(format!("line {line} not claimed")))?;
        let mut state = entry
            .lock()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;

        state.direction = Direction::Output;
        state.driven = level;
        Ok(())
    }

    fn set_input(&self, line: u32) -> Result<(), LineError> {
        let lines = self
            .lines
            .read()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        let entry = lines
            .get(&line)
            .ok_or_else(|| LineError::Hardware(format!("line {line} not claimed")))?;
        let mut state = entry
            .lock()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;

        state.direction = Direction::Input;
        Ok(())
    }

    fn drive(&self, line: u32, level: Level) -> Result<(), LineError> {
        let lines = self
            .lines
            .read()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        let entry = lines
            .get(&line)
            .ok_or_else(|| LineError::Hardware(format!("line {line} not claimed")))?;
        let mut state = entry
            .lock()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;

        state.driven = level;
        Ok(())
    }

    fn sense(&self, line: u32) -> Result<Level, LineError> {
        let lines = self
            .lines
            .read()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        let entry = lines
            .get(&line)
            .ok_or_else(|| LineError::Hardware(format!("line {line} not claimed")))?;
        let state = entry
            .lock()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;

        Ok(match state.direction {
            Direction::Input => state.sensed,
            Direction::Output => state.driven,
        })
    }

    fn install_edge_handler(
        &self,
        line: u32,
        trigger: EdgeTrigger,
        sink: EdgeSink,
    ) -> Result<(), LineError> {
        if self.install_failures.lock().contains(&line) {
            return Err(LineError::Hardware(format!(
                "no free interrupt slot for line {line}"
            )));
        }

        let lines = self
            .lines
            .read()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        let entry = lines
            .get(&line)
            .ok_or_else(|| LineError::Hardware(format!("line {line} not claimed")))?;
        let mut state = entry
            .lock()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;

        if state.handler.is_some() {
            return Err(LineError::Hardware(format!(
                "edge handler already installed on line {line}"
            )));
        }
        state.handler = Some((trigger, sink));
        Ok(())
    }

    fn remove_edge_handler(&self, line: u32) -> Result<(), LineError> {
        let lines = self
            .lines
            .read()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        let entry = lines
            .get(&line)
            .ok_or_else(|| LineError::Hardware(format!("line {line} not claimed")))?;
        let mut state = entry
            .lock()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;

        if state.handler.take().is_none() {
            return Err(LineError::Hardware(format!(
                "no edge handler installed on line {line}"
            )));
        }
        Ok(())
    }

    fn release(&self, line: u32) -> Result<(), LineError> {
        let mut lines = self
            .lines
            .write()
            .map_err(|e| LineError::Hardware(format!("lock poisoned: {e}")))?;
        lines
            .remove(&line)
            .ok_or_else(|| LineError::Hardware(format!("line {line} not claimed")))?;
        Ok(())
    }
}
