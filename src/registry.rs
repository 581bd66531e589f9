use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;

use crate::command::Command;
use crate::config::AppConfig;
use crate::error::LineError;
use crate::interrupt::{EdgeNotification, EdgeNotifier, EdgeSink};
use crate::line::{
    Direction, EdgeTrigger, Level, Line, LineState, MAX_LINE_NUMBER, NUM_LINES, RESERVED_LINES,
};

pub type LineRegistry<B> = GenericLineRegistry<B>;

pub trait GpioBackend: Send + Sync {
    fn claim(&self, line: u32) -> Result<(), LineError>;
    fn set_output(&self, line: u32, level: Level) -> Result<(), LineError>;
    fn set_input(&self, line: u32) -> Result<(), LineError>;
    fn drive(&self, line: u32, level: Level) -> Result<(), LineError>;
    fn sense(&self, line: u32) -> Result<Level, LineError>;
    fn install_edge_handler(
        &self,
        line: u32,
        trigger: EdgeTrigger,
        sink: EdgeSink,
    ) -> Result<(), LineError>;
    fn remove_edge_handler(&self, line: u32) -> Result<(), LineError>;
    fn release(&self, line: u32) -> Result<(), LineError>;
}

#[derive(Debug)]
pub struct GenericLineRegistry<B: GpioBackend> {
    backend: Arc<B>,
    lines: FxHashMap<u32, Line>,
    notifier: EdgeSink,
    shut_down: AtomicBool,
}

impl<B: GpioBackend> GenericLineRegistry<B> {
    pub fn initialize(config: Arc<AppConfig>, backend: Arc<B>) -> Result<Self, LineError> {
        let notifier = Arc::new(EdgeNotifier::new(
            config.debounce_window_ms,
            config.broadcast_capacity,
        ));

        let mut lines = FxHashMap::default();
        for id in 0..MAX_LINE_NUMBER {
            if RESERVED_LINES.contains(&id) {
                continue;
            }
            if let Err(e) = backend.claim(id) {
                // initialization is all-or-nothing: undo every claim taken so far
                for claimed in lines.keys() {
                    let _ = backend.release(*claimed);
                }
                return Err(e);
            }
            lines.insert(id, Line::new(id));
        }

        debug_assert_eq!(lines.len(), NUM_LINES);
        info!("Line registry initialized with {} lines", lines.len());
        Ok(Self {
            backend,
            lines,
            notifier,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn resolve(&self, id: u32) -> Result<&Line, LineError> {
        self.lines.get(&id).ok_or(LineError::UnknownLine(id))
    }

    pub fn open(&self, id: u32) -> Result<LineHandle<'_, B>, LineError> {
        let line = self.resolve(id)?;
        info!("Line {id} opened");

        let mut holds_irq_ref = false;
        {
            let mut state = line.state.lock();
            if state.interrupt_armed && state.direction == Direction::Input {
                let trigger = state.edge_trigger;
                self.arm_locked(line, &mut state, trigger)?;
                holds_irq_ref = true;
            }
        }

        Ok(LineHandle {
            registry: self,
            id,
            holds_irq_ref,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EdgeNotification> {
        self.notifier.subscribe()
    }

    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        for (id, line) in &self.lines {
            let mut state = line.state.lock();
            if state.interrupt_refcount > 0 {
                if let Err(e) = self.backend.remove_edge_handler(*id) {
                    warn!("Failed to remove edge handler on line {id}: {e}");
                }
            }
            if let Err(e) = self.backend.set_output(*id, Level::Low) {
                warn!("Failed to reset line {id}: {e}");
            }
            *state = LineState::default();
            drop(state);
            if let Err(e) = self.backend.release(*id) {
                warn!("Failed to release line {id}: {e}");
            }
        }

        info!("Line registry shut down");
    }

    // Caller holds the line lock. A refcount of zero installs the handler;
    // any later claimant only bumps the count and the existing trigger
    // direction wins.
    fn arm_locked(
        &self,
        line: &Line,
        state: &mut LineState,
        trigger: EdgeTrigger,
    ) -> Result<(), LineError> {
        if state.interrupt_refcount == 0 {
            if let Err(e) =
                self.backend
                    .install_edge_handler(line.id, trigger, self.notifier.clone())
            {
                state.interrupt_armed = false;
                state.edge_trigger = EdgeTrigger::None;
                return Err(LineError::InterruptRegistrationFailed(e.to_string()));
            }
            state.edge_trigger = trigger;
            info!("Interrupt requested on line {}", line.id);
        } else if trigger != state.edge_trigger {
            warn!(
                "Line {} already armed for {:?}, ignoring {:?}",
                line.id, state.edge_trigger, trigger
            );
        }
        state.interrupt_armed = true;
        state.interrupt_refcount += 1;
        Ok(())
    }

    fn apply(&self, id: u32, cmd: Command, holds_irq_ref: &mut bool) -> Result<(), LineError> {
        let line = self.resolve(id)?;
        let mut state = line.state.lock();

        match cmd {
            Command::DirectionOut => {
                if state.direction != Direction::Output {
                    // an output line can never stay armed
                    if state.interrupt_refcount > 0 {
                        self.backend.remove_edge_handler(id)?;
                        state.interrupt_refcount = 0;
                    }
                    state.interrupt_armed = false;
                    state.edge_trigger = EdgeTrigger::None;
                    *holds_irq_ref = false;

                    self.backend.set_output(id, Level::Low)?;
                    state.direction = Direction::Output;
                    state.level = Level::Low;
                    info!("Line {id} direction set to output");
                }
            }
            Command::DirectionIn => {
                if state.direction != Direction::Input {
                    self.backend.set_input(id)?;
                    state.direction = Direction::Input;
                    info!("Line {id} direction set to input");
                }
            }
            Command::Drive(level) => {
                if state.direction == Direction::Input {
                    return Err(LineError::InvalidOperation(format!(
                        "Cannot drive line {id} while configured as input"
                    )));
                }
                self.backend.drive(id, level)?;
                state.level = level;
                info!("Line {id} level set to {}", level.as_char());
            }
            Command::Arm(trigger) => {
                if state.direction != Direction::Input {
                    self.backend.set_input(id)?;
                    state.direction = Direction::Input;
                }
                if *holds_irq_ref && state.interrupt_refcount > 0 {
                    // this handle already holds a refcount unit; re-arming
                    // only restores the armed flag after a disable-irq
                    if state.edge_trigger != EdgeTrigger::None && trigger != state.edge_trigger {
                        warn!(
                            "Line {id} already armed for {:?}, ignoring {trigger:?}",
                            state.edge_trigger
                        );
                    }
                    state.interrupt_armed = true;
                } else {
                    // a unit held before a teardown via `out` is stale
                    *holds_irq_ref = false;
                    self.arm_locked(line, &mut state, trigger)?;
                    *holds_irq_ref = true;
                }
            }
            Command::DisableIrq => {
                // the installed handler stays; it is freed on the next close
                state.interrupt_armed = false;
                info!("Interrupt delivery disabled on line {id}");
            }
        }

        Ok(())
    }
}

impl<B: GpioBackend> Drop for GenericLineRegistry<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub struct LineHandle<'a, B: GpioBackend> {
    registry: &'a GenericLineRegistry<B>,
    id: u32,
    holds_irq_ref: bool,
}

impl<B: GpioBackend> LineHandle<'_, B> {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn write(&mut self, text: &str) -> Result<usize, LineError> {
        let cmd: Command = text.trim_end().parse()?;
        self.registry.apply(self.id, cmd, &mut self.holds_irq_ref)?;
        Ok(text.len())
    }

    pub fn read(&self, count: usize) -> Result<String, LineError> {
        let line = self.registry.resolve(self.id)?;

        let mut samples = String::with_capacity(count);
        for _ in 0..count {
            let state = line.state.lock();
            let level = match state.direction {
                Direction::Output => state.level,
                Direction::Input => self.registry.backend.sense(self.id)?,
            };
            samples.push(level.as_char());
        }
        Ok(samples)
    }
}

impl<B: GpioBackend> Drop for LineHandle<'_, B> {
    fn drop(&mut self) {
        if self.registry.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let Ok(line) = self.registry.resolve(self.id) else {
            return;
        };
        let mut state = line.state.lock();
        info!("Closing line {}", self.id);

        if state.interrupt_armed {
            if self.holds_irq_ref && state.interrupt_refcount > 0 {
                state.interrupt_refcount -= 1;
                if state.interrupt_refcount == 0 {
                    if let Err(e) = self.registry.backend.remove_edge_handler(self.id) {
                        warn!("Failed to remove edge handler on line {}: {e}", self.id);
                    }
                    state.interrupt_armed = false;
                    state.edge_trigger = EdgeTrigger::None;
                    info!("Interrupt on line {} released", self.id);
                }
            }
        } else if state.interrupt_refcount > 0 {
            // disable-irq left the handler installed; any close frees it
            if let Err(e) = self.registry.backend.remove_edge_handler(self.id) {
                warn!("Failed to remove edge handler on line {}: {e}", self.id);
            }
            state.interrupt_refcount = 0;
            state.edge_trigger = EdgeTrigger::None;
            info!("Interrupt on line {} disabled", self.id);
        }
    }
}
