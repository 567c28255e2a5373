//! Progress reporting
//!
//! Walkers report what they are doing through a [`Progress`] sink. In log
//! mode that becomes `tracing` events; in porcelain mode every change is a
//! JSON-patch line on stderr against the document
//! `{"messages":[],"progress_bars":{}}`, which is emitted first.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::Write;

/// State of one progress bar as seen by porcelain consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressBar {
    pub desc: String,
    pub unit: String,
    pub remaining: u64,
    pub current: u64,
}

enum Sink {
    Silent,
    Log,
    Porcelain(Mutex<Box<dyn Write + Send>>),
}

pub struct Progress {
    sink: Sink,
    bars: Mutex<BTreeMap<String, ProgressBar>>,
}

impl Progress {
    /// Discards everything
    pub fn silent() -> Self {
        Self::with_sink(Sink::Silent)
    }

    /// Forwards messages and bar updates to `tracing`
    pub fn log() -> Self {
        Self::with_sink(Sink::Log)
    }

    /// Writes JSON-patch lines to `writer`, starting with the initial document
    pub fn porcelain(writer: Box<dyn Write + Send>) -> Self {
        let progress = Self::with_sink(Sink::Porcelain(Mutex::new(writer)));
        progress.emit(&json!({"messages": [], "progress_bars": {}}));
        progress
    }

    pub fn porcelain_stderr() -> Self {
        Self::porcelain(Box::new(std::io::stderr()))
    }

    fn with_sink(sink: Sink) -> Self {
        Self {
            sink,
            bars: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn is_porcelain(&self) -> bool {
        matches!(self.sink, Sink::Porcelain(_))
    }

    fn emit(&self, value: &Value) {
        if let Sink::Porcelain(writer) = &self.sink {
            let mut writer = writer.lock();
            let result = serde_json::to_writer(&mut *writer, value)
                .map_err(std::io::Error::from)
                .and_then(|_| writer.write_all(b"\n"))
                .and_then(|_| writer.flush());
            if let Err(e) = result {
                tracing::debug!("Dropping progress patch: {}", e);
            }
        }
    }

    /// Reports a general message
    pub fn message(&self, text: &str) {
        match &self.sink {
            Sink::Silent => {}
            Sink::Log => tracing::info!("{}", text),
            Sink::Porcelain(_) => self.emit(&json!([
                {"op": "add", "path": "/messages/-", "value": text}
            ])),
        }
    }

    /// Starts a bar; `id` must be unique for the run
    pub fn add_bar(&self, id: &str, desc: &str, unit: &str) {
        let bar = ProgressBar {
            desc: desc.to_string(),
            unit: unit.to_string(),
            remaining: 0,
            current: 0,
        };
        match &self.sink {
            Sink::Silent => return,
            Sink::Log => tracing::debug!("{}: started ({})", id, desc),
            Sink::Porcelain(_) => self.emit(&json!([
                {"op": "add", "path": format!("/progress_bars/{}", id), "value": bar}
            ])),
        }
        self.bars.lock().insert(id.to_string(), bar);
    }

    /// Counts one processed unit and records how many remain
    pub fn update_bar(&self, id: &str, remaining: u64) {
        if matches!(self.sink, Sink::Silent) {
            return;
        }

        let bar = {
            let mut bars = self.bars.lock();
            let Some(bar) = bars.get_mut(id) else {
                return;
            };
            bar.remaining = remaining;
            bar.current += 1;
            bar.clone()
        };

        match &self.sink {
            Sink::Porcelain(_) => self.emit(&json!([
                {"op": "replace", "path": format!("/progress_bars/{}", id), "value": bar}
            ])),
            _ => tracing::trace!("{}: {} done, {} remaining", id, bar.current, remaining),
        }
    }

    /// Snapshot of a bar, if it exists
    pub fn bar(&self, id: &str) -> Option<ProgressBar> {
        self.bars.lock().get(id).cloned()
    }
}
