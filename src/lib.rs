mod backend;
mod command;
mod config;
mod error;
mod interrupt;
mod line;
mod registry;

pub use command::Command;
pub use config::AppConfig;
pub use error::LineError;
pub use interrupt::{EdgeNotification, EdgeNotifier, EdgeSink};
pub use line::{
    Direction, EdgeTrigger, Level, Line, LineState, MAX_LINE_NUMBER, NUM_LINES, RESERVED_LINES,
};
pub use registry::{GenericLineRegistry, GpioBackend, LineHandle, LineRegistry};

#[cfg(feature = "hardware-gpio")]
pub use backend::LibgpiodBackend;
pub use backend::MockBackend;
