//! Run log broadcasting.
//!
//! Every pipeline event goes through a process-wide broadcast channel so
//! that callers can follow a run as it happens (the CLI records it with
//! [`LogBroadcaster::record_while`]). Each event is also written to stderr,
//! leaving stdout for command output.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::{self, Write};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    /// Nesting level (row events sit under their stage)
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            indent: 0,
        }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    /// Line as written to stderr
    pub fn render(&self) -> String {
        let prefix = match self.level {
            LogLevel::Info => "   ",
            LogLevel::Success => "   ✓",
            LogLevel::Warning => "   ⚠️",
            LogLevel::Error => "   ❌",
        };
        let indent = "   ".repeat(self.indent as usize);
        format!("{}{} {}", indent, prefix, self.message)
    }
}

/// Global log broadcaster
pub static LOG_BROADCASTER: Lazy<LogBroadcaster> = Lazy::new(LogBroadcaster::new);

/// Fans log entries out to every subscriber
pub struct LogBroadcaster {
    sender: broadcast::Sender<LogEntry>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }

    /// Print an entry and send it to all subscribers
    pub fn log(&self, entry: LogEntry) {
        eprintln!("{}", entry.render());

        // No subscribers is fine
        let _ = self.sender.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }

    /// Drive `fut` to completion, writing every entry logged meanwhile to
    /// `sink` as one JSON object per line.
    ///
    /// The first write error stops recording; `fut` still runs to the end.
    pub async fn record_while<F, W>(&self, fut: F, sink: &mut W) -> (F::Output, io::Result<()>)
    where
        F: Future,
        W: Write,
    {
        let mut rx = self.subscribe();
        let mut written = Ok(());
        tokio::pin!(fut);

        let output = loop {
            tokio::select! {
                output = &mut fut => break output,
                received = rx.recv() => {
                    let entry = match received {
                        Ok(entry) => entry,
                        Err(RecvError::Lagged(n)) => dropped(n),
                        // Unreachable while `self` holds the sender
                        Err(RecvError::Closed) => continue,
                    };
                    if written.is_ok() {
                        written = write_json_line(sink, &entry);
                    }
                }
            }
        };

        loop {
            let entry = match rx.try_recv() {
                Ok(entry) => entry,
                Err(TryRecvError::Lagged(n)) => dropped(n),
                Err(_) => break,
            };
            if written.is_ok() {
                written = write_json_line(sink, &entry);
            }
        }

        (output, written)
    }
}

fn dropped(count: u64) -> LogEntry {
    LogEntry::warning(format!("{} log entries were dropped", count))
}

fn write_json_line<W: Write>(sink: &mut W, entry: &LogEntry) -> io::Result<()> {
    let line = serde_json::to_string(entry)?;
    writeln!(sink, "{}", line)
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

pub fn log_info(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::info(msg));
}

pub fn log_success(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::success(msg));
}

pub fn log_warning(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::warning(msg));
}

pub fn log_error(msg: impl Into<String>) {
    LOG_BROADCASTER.log(LogEntry::error(msg));
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::info(msg).with_indent(indent));
}

pub fn log_success_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::success(msg).with_indent(indent));
}

pub fn log_warning_indent(msg: impl Into<String>, indent: u8) {
    LOG_BROADCASTER.log(LogEntry::warning(msg).with_indent(indent));
}
