use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const MAX_LINE_NUMBER: u32 = 28;
pub const RESERVED_LINES: [u32; 2] = [0, 1];
pub const NUM_LINES: usize = MAX_LINE_NUMBER as usize - RESERVED_LINES.len();

#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn as_char(self) -> char {
        match self {
            Level::Low => '0',
            Level::High => '1',
        }
    }
}

#[derive(Debug, Hash, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeTrigger {
    None,
    Rising,
    Falling,
}

impl Default for EdgeTrigger {
    fn default() -> Self {
        EdgeTrigger::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineState {
    pub direction: Direction,
    pub level: Level,
    pub edge_trigger: EdgeTrigger,
    pub interrupt_armed: bool,
    pub interrupt_refcount: u32,
}

impl Default for LineState {
    fn default() -> Self {
        Self {
            direction: Direction::Output,
            level: Level::Low,
            edge_trigger: EdgeTrigger::None,
            interrupt_armed: false,
            interrupt_refcount: 0,
        }
    }
}

#[derive(Debug)]
pub struct Line {
    pub id: u32,
    pub(crate) state: Mutex<LineState>,
}

impl Line {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            state: Mutex::new(LineState::default()),
        }
    }

    pub fn snapshot(&self) -> LineState {
        *self.state.lock()
    }
}
