use crate::project::ProjectPath;
use crate::registry::{FromProject, Registry};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio::sync::broadcast;

/// Lines kept per service before the oldest are overwritten.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;
/// Entries a subscriber may fall behind before it starts losing lines.
const SUBSCRIBER_BACKLOG: usize = 256;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Guesses the level of a raw output line from its wording.
    pub fn infer(message: &str) -> Self {
        let lower = message.to_lowercase();
        if ["error", "exception", "fatal", "panic"]
            .iter()
            .any(|word| lower.contains(word))
        {
            LogLevel::Error
        } else if lower.contains("warn") {
            LogLevel::Warn
        } else if lower.contains("debug") || lower.contains("trace") {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of service output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub service: String,
    pub message: String,
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_stderr: bool,
}

impl LogEntry {
    pub fn new(service: impl Into<String>, message: impl Into<String>, is_stderr: bool) -> Self {
        let message = message.into();
        Self {
            service: service.into(),
            level: LogLevel::infer(&message),
            message,
            timestamp: Utc::now(),
            is_stderr,
        }
    }
}

/// Bounded ring of recent lines for one service, with live fan-out.
pub struct LogBuffer {
    service: String,
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
    sender: broadcast::Sender<LogEntry>,
}

impl LogBuffer {
    pub fn new(service: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(SUBSCRIBER_BACKLOG);
        Self {
            service: service.into(),
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY))),
            sender,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn add(&self, entry: LogEntry) {
        {
            let mut entries = self.entries.lock();
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        // No receivers is not an error.
        let _ = self.sender.send(entry);
    }

    /// The last `n` entries, oldest first. `0` means everything buffered.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock();
        let skip = match n {
            0 => 0,
            n => entries.len().saturating_sub(n),
        };
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn since(&self, since: DateTime<Utc>) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.timestamp >= since)
            .cloned()
            .collect()
    }

    pub fn by_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.level == level)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// New lines from now on. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Per-project log buffers, one per service, created on first line.
pub struct LogStore {
    project: ProjectPath,
    capacity: usize,
    buffers: RwLock<HashMap<String, Arc<LogBuffer>>>,
    all: broadcast::Sender<LogEntry>,
}

impl FromProject for LogStore {
    fn from_project(project: ProjectPath) -> Self {
        Self::with_capacity(project, DEFAULT_LOG_CAPACITY)
    }
}

impl LogStore {
    pub fn with_capacity(project: ProjectPath, capacity: usize) -> Self {
        let (all, _) = broadcast::channel(SUBSCRIBER_BACKLOG);
        Self {
            project,
            capacity,
            buffers: RwLock::new(HashMap::new()),
            all,
        }
    }

    pub fn project(&self) -> &ProjectPath {
        &self.project
    }

    /// Records one line of output for `service`.
    pub fn append(&self, service: &str, message: impl Into<String>, is_stderr: bool) {
        self.push(LogEntry::new(service, message, is_stderr));
    }

    pub fn push(&self, entry: LogEntry) {
        let buffer = self.buffer_or_create(&entry.service);
        buffer.add(entry.clone());
        let _ = self.all.send(entry);
    }

    fn buffer_or_create(&self, service: &str) -> Arc<LogBuffer> {
        if let Some(buffer) = self.buffers.read().get(service) {
            return buffer.clone();
        }
        self.buffers
            .write()
            .entry(service.to_string())
            .or_insert_with(|| {
                tracing::debug!(event = "log_buffer_created", project = %self.project, service);
                Arc::new(LogBuffer::new(service, self.capacity))
            })
            .clone()
    }

    pub fn buffer(&self, service: &str) -> Option<Arc<LogBuffer>> {
        self.buffers.read().get(service).cloned()
    }

    /// Every buffer, ordered by service name.
    pub fn buffers(&self) -> Vec<Arc<LogBuffer>> {
        let mut buffers: Vec<_> = self.buffers.read().values().cloned().collect();
        buffers.sort_by(|a, b| a.service().cmp(b.service()));
        buffers
    }

    /// The last `n` lines across all services, ordered by time. `0` means all.
    pub fn recent_all(&self, n: usize) -> Vec<LogEntry> {
        let mut entries: Vec<_> = self
            .buffers()
            .iter()
            .flat_map(|buffer| buffer.recent(n))
            .collect();
        entries.sort_by_key(|entry| entry.timestamp);
        if n > 0 && entries.len() > n {
            entries.drain(..entries.len() - n);
        }
        entries
    }

    /// Drops a service's buffer. Its subscribers see the stream close.
    pub fn remove(&self, service: &str) -> Option<Arc<LogBuffer>> {
        self.buffers.write().remove(service)
    }

    /// Lines from every service, including services that appear later.
    pub fn subscribe_all(&self) -> broadcast::Receiver<LogEntry> {
        self.all.subscribe()
    }

    /// Receivers currently following every service.
    pub fn subscriber_count(&self) -> usize {
        self.all.receiver_count()
    }
}

pub type LogRegistry = Registry<LogStore>;

static GLOBAL_LOGS: OnceLock<Arc<LogRegistry>> = OnceLock::new();

impl Registry<LogStore> {
    /// Process-wide log registry.
    pub fn global() -> Arc<LogRegistry> {
        GLOBAL_LOGS
            .get_or_init(|| Arc::new(LogRegistry::new()))
            .clone()
    }
}
