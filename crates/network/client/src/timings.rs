//! Zeitstempel rund um RPCs und Stream-Operationen.

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingEvent {
    PlugControllerRequest,
    PlugControllerResponse,
    ClientReadyWriteStart,
    ClientReadyWriteFinish,
    StartGameReadStart,
    StartGameReadFinish,
    KeyStateWriteStart,
    KeyStateWriteFinish,
    KeyStateReadStart,
    KeyStateReadFinish,
    RemoteKeyStateRequested,
    RemoteKeyStateReturned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingEntry {
    pub event: TimingEvent,
    /// Nanoseconds since the Unix epoch.
    pub nanos: u64,
}

/// Append-only log of [`TimingEntry`] values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    entries: Vec<TimingEntry>,
}

pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

impl Timings {
    pub fn record(&mut self, event: TimingEvent) {
        self.entries.push(TimingEntry {
            event,
            nanos: now_nanos(),
        });
    }

    pub fn entries(&self) -> &[TimingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

/// Handle shared by a client and the event stream handlers it creates.
#[derive(Debug, Clone, Default)]
pub struct TimingsRecorder {
    inner: Arc<Mutex<Timings>>,
}

impl TimingsRecorder {
    pub fn record(&self, event: TimingEvent) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record(event);
    }

    pub fn snapshot(&self) -> Timings {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}
