use log::warn;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, yield_now};
use std::time::Duration;

use libgpiod::{chip::Chip, line, line::EventClock, request};
use parking_lot::{FairMutex, RwLock};
use rustc_hash::FxHashMap;
use std::path::PathBuf;

use crate::error::LineError;
use crate::interrupt::EdgeSink;
use crate::line::{EdgeTrigger, Level};
use crate::registry::GpioBackend;

const EVENT_BUFFER_CAPACITY: usize = 64;
const EVENT_WAIT_TIMEOUT: Duration = Duration::from_millis(10);

pub struct LibgpiodBackend {
    chip_path: String,
    lines: RwLock<FxHashMap<u32, LineSlot>>, // keyed by line offset
}

struct LineSlot {
    handle: Arc<FairMutex<GpiodHandle>>,
    listener: Option<EdgeListener>, // joined before reconfiguring or releasing
}

struct GpiodHandle {
    request: request::Request,
}

impl GpiodHandle {
    fn new(chip: &str, line_cfg: &line::Config) -> Result<Self, LineError> {
        let chip = Self::open_chip(chip)?;
        let request = Self::request_lines(&chip, line_cfg)?;
        Ok(Self { request })
    }

    fn open_chip(path: &str) -> Result<Chip, LineError> {
        let p = PathBuf::from(path);
        Chip::open(&p).map_err(|e| LineError::Hardware(format!("open chip {path}: {e}")))
    }

    fn request_lines(chip: &Chip, line_cfg: &line::Config) -> Result<request::Request, LineError> {
        let mut req_cfg = request::Config::new()
            .map_err(|e| LineError::Hardware(format!("request config: {e}")))?;
        req_cfg
            .set_consumer(env!("CARGO_PKG_NAME"))
            .map_err(|e| LineError::Hardware(format!("request consumer: {e}")))?;
        chip.request_lines(Some(&req_cfg), line_cfg)
            .map_err(|e| LineError::Hardware(format!("request lines: {e}")))
    }
}

struct EdgeListener {
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EdgeListener {
    fn new(
        offset: u32,
        gpiod_handle: Arc<FairMutex<GpiodHandle>>,
        sink: EdgeSink,
    ) -> Result<Self, LineError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = cancel.clone();
        let mut buffer = request::Buffer::new(EVENT_BUFFER_CAPACITY)
            .map_err(|e| LineError::Hardware(format!("event buffer: {e}")))?;

        let handle = std::thread::spawn(move || {
            while !cancel_flag.load(Ordering::Relaxed) {
                let hdl = gpiod_handle.lock();
                let req = &hdl.request;

                let has_event = match req.wait_edge_events(Some(EVENT_WAIT_TIMEOUT)) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("wait edge events error for line {offset}: {e}");
                        yield_now();
                        continue;
                    }
                };
                if !has_event {
                    continue;
                }

                let events = match req.read_edge_events(&mut buffer) {
                    Ok(evts) => evts,
                    Err(e) => {
                        warn!("read edge events error for line {offset}: {e}");
                        yield_now();
                        continue;
                    }
                };
                for evt in events {
                    let evt = match evt {
                        Ok(e) => e,
                        Err(_) => continue,
                    };
                    let trigger = match evt.event_type() {
                        Ok(line::EdgeKind::Rising) => EdgeTrigger::Rising,
                        Ok(line::EdgeKind::Falling) => EdgeTrigger::Falling,
                        Err(_) => continue,
                    };

                    sink.dispatch(offset, trigger);
                }
            }
        });

        Ok(Self {
            cancel,
            handle: Some(handle),
        })
    }
}

impl Drop for EdgeListener {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl LibgpiodBackend {
    pub fn new(chip_path: impl Into<String>) -> Self {
        Self {
            chip_path: chip_path.into(),
            lines: RwLock::new(FxHashMap::default()),
        }
    }

    fn not_claimed(offset: u32) -> LineError {
        LineError::Hardware(format!("line {offset} not claimed"))
    }

    fn to_value(level: Level) -> line::Value {
        match level {
            Level::Low => line::Value::InActive,
            Level::High => line::Value::Active,
        }
    }

    fn output_settings() -> Result<line::Settings, LineError> {
        let mut ls = line::Settings::new()
            .map_err(|e| LineError::Hardware(format!("libgpiod settings: {e}")))?;
        ls.set_direction(line::Direction::Output)
            .map_err(|e| LineError::Hardware(format!("set direction: {e}")))?;
        ls.set_drive(line::Drive::PushPull)
            .map_err(|e| LineError::Hardware(format!("set drive: {e}")))?;
        Ok(ls)
    }

    fn input_settings(edge: Option<line::Edge>) -> Result<line::Settings, LineError> {
        let mut ls = line::Settings::new()
            .map_err(|e| LineError::Hardware(format!("libgpiod settings: {e}")))?;
        ls.set_direction(line::Direction::Input)
            .map_err(|e| LineError::Hardware(format!("set direction: {e}")))?;
        ls.set_bias(None)
            .map_err(|e| LineError::Hardware(format!("set bias: {e}")))?;

        if edge.is_some() {
            ls.set_edge_detection(edge)
                .map_err(|e| LineError::Hardware(format!("set edge detection: {e}")))?;
            ls.set_event_clock(EventClock::Realtime)
                .map_err(|e| LineError::Hardware(format!("set event clock: {e}")))?;
        }
        Ok(ls)
    }

    fn line_config(offset: u32, settings: line::Settings) -> Result<line::Config, LineError> {
        let mut cfg =
            line::Config::new().map_err(|e| LineError::Hardware(format!("line config: {e}")))?;
        cfg.add_line_settings(&[offset], settings)
            .map_err(|e| LineError::Hardware(format!("line config add settings: {e}")))?;
        Ok(cfg)
    }

    fn reconfigure(&self, offset: u32, settings: line::Settings) -> Result<(), LineError> {
        let lines = self.lines.read();
        let slot = lines.get(&offset).ok_or_else(|| Self::not_claimed(offset))?;
        let cfg = Self::line_config(offset, settings)?;
        slot.handle
            .lock()
            .request
            .reconfigure_lines(&cfg)
            .map_err(|e| LineError::Hardware(format!("reconfigure lines: {e}")))
    }
}

impl GpioBackend for LibgpiodBackend {
    fn claim(&self, offset: u32) -> Result<(), LineError> {
        let cfg = Self::line_config(offset, Self::output_settings()?)?;
        let handle = GpiodHandle::new(&self.chip_path, &cfg)?;
        handle
            .request
            .set_value(offset, line::Value::InActive)
            .map_err(|e| LineError::Hardware(format!("set value: {e}")))?;

        let mut lines = self.lines.write();
        if lines.contains_key(&offset) {
            return Err(LineError::Hardware(format!("line {offset} already claimed")));
        }
        lines.insert(
            offset,
            LineSlot {
                handle: Arc::new(FairMutex::new(handle)),
                listener: None,
            },
        );
        Ok(())
    }

    fn set_output(&self, offset: u32, level: Level) -> Result<(), LineError> {
        self.reconfigure(offset, Self::output_settings()?)?;

        let lines = self.lines.read();
        let slot = lines.get(&offset).ok_or_else(|| Self::not_claimed(offset))?;
        slot.handle
            .lock()
            .request
            .set_value(offset, Self::to_value(level))
            .map_err(|e| LineError::Hardware(format!("set value: {e}")))
    }

    fn set_input(&self, offset: u32) -> Result<(), LineError> {
        self.reconfigure(offset, Self::input_settings(None)?)
    }

    fn drive(&self, offset: u32, level: Level) -> Result<(), LineError> {
        let lines = self.lines.read();
        let slot = lines.get(&offset).ok_or_else(|| Self::not_claimed(offset))?;
        slot.handle
            .lock()
            .request
            .set_value(offset, Self::to_value(level))
            .map_err(|e| LineError::Hardware(format!("set value: {e}")))
    }

    fn sense(&self, offset: u32) -> Result<Level, LineError> {
        let lines = self.lines.read();
        let slot = lines.get(&offset).ok_or_else(|| Self::not_claimed(offset))?;

        let value = slot
            .handle
            .lock()
            .request
            .value(offset)
            .map_err(|e| LineError::Hardware(format!("get value: {e}")))?;
        Ok(match value {
            line::Value::InActive => Level::Low,
            line::Value::Active => Level::High,
        })
    }

    fn install_edge_handler(
        &self,
        offset: u32,
        trigger: EdgeTrigger,
        sink: EdgeSink,
    ) -> Result<(), LineError> {
        let edge = match trigger {
            EdgeTrigger::Rising => line::Edge::Rising,
            EdgeTrigger::Falling => line::Edge::Falling,
            EdgeTrigger::None => {
                return Err(LineError::Hardware(
                    "edge handler requires a trigger".to_string(),
                ));
            }
        };

        let mut lines = self.lines.write();
        let slot = lines
            .get_mut(&offset)
            .ok_or_else(|| Self::not_claimed(offset))?;
        if slot.listener.is_some() {
            return Err(LineError::Hardware(format!(
                "edge handler already installed on line {offset}"
            )));
        }

        let cfg = Self::line_config(offset, Self::input_settings(Some(edge))?)?;
        slot.handle
            .lock()
            .request
            .reconfigure_lines(&cfg)
            .map_err(|e| LineError::Hardware(format!("reconfigure lines: {e}")))?;

        slot.listener = Some(EdgeListener::new(offset, slot.handle.clone(), sink)?);
        Ok(())
    }

    fn remove_edge_handler(&self, offset: u32) -> Result<(), LineError> {
        let mut lines = self.lines.write();
        let slot = lines
            .get_mut(&offset)
            .ok_or_else(|| Self::not_claimed(offset))?;
        let Some(listener) = slot.listener.take() else {
            return Err(LineError::Hardware(format!(
                "no edge handler installed on line {offset}"
            )));
        };
        drop(listener); // joins the listener thread before reconfiguring

        let cfg = Self::line_config(offset, Self::input_settings(None)?)?;
        slot.handle
            .lock()
            .request
            .reconfigure_lines(&cfg)
            .map_err(|e| LineError::Hardware(format!("reconfigure lines: {e}")))
    }

    fn release(&self, offset: u32) -> Result<(), LineError> {
        let mut lines = self.lines.write();
        let mut slot = lines
            .remove(&offset)
            .ok_or_else(|| Self::not_claimed(offset))?;
        slot.listener.take(); // join any listener before dropping the request
        Ok(())
    }
}
