//! Structured log of supervised external commands.
//!
//! Every download, list and unpack invocation can be appended as one JSON
//! line under the prefix `logs/` directory. Logging is best effort; a
//! failure to record is reported as a warning by the caller and never
//! fails the operation itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;

use super::prefix::Prefix;
use crate::collector::OutputCollector;

const LOG_FILE: &str = "commands.jsonl";
const LOG_TAIL_LINES: usize = 20;

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output_tail: String,
}

#[derive(Debug, Clone)]
pub struct CommandLogger {
    log_dir: PathBuf,
    enabled: bool,
}

impl CommandLogger {
    pub fn new(prefix: &Prefix, enabled: bool) -> Self {
        Self {
            log_dir: prefix.logs(),
            enabled,
        }
    }

    fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE)
    }

    /// Append one entry for a finished collector session.
    pub fn log(&self, collector: &OutputCollector) -> io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let entry = CommandLogEntry {
            timestamp: Utc::now(),
            command: collector.command().to_string(),
            success: collector.success().unwrap_or(false),
            exit_code: collector.exit_code(),
            output_tail: collector.tail(LOG_TAIL_LINES, false),
        };
        let line = serde_json::to_string(&entry).map_err(io::Error::other)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file())?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// All recorded entries, oldest first.
    pub fn entries(&self) -> io::Result<Vec<CommandLogEntry>> {
        let log_file = self.log_file();
        if !log_file.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&log_file)?;
        let mut entries = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: CommandLogEntry =
                serde_json::from_str(line).map_err(io::Error::other)?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn clear(&self) -> io::Result<()> {
        let log_file = self.log_file();
        if log_file.exists() {
            std::fs::remove_file(&log_file)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectOptions, OutputCollector};
    use std::process::Command;
    use tempfile::tempdir;

    fn finished_collector(script: &str) -> OutputCollector {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        let mut collector = OutputCollector::spawn(command, CollectOptions::new()).unwrap();
        collector.wait();
        collector
    }

    #[test]
    fn logs_append_and_read_back() {
        let dir = tempdir().unwrap();
        let prefix = Prefix::create(dir.path()).unwrap();
        let logger = CommandLogger::new(&prefix, true);

        logger.log(&finished_collector("echo one")).unwrap();
        logger.log(&finished_collector("echo two >&2; exit 1")).unwrap();

        let entries = logger.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].success);
        assert!(entries[0].output_tail.contains("one"));
        assert!(!entries[1].success);
        assert_eq!(entries[1].exit_code, Some(1));
    }

    #[test]
    fn disabled_logger_writes_nothing() {
        let dir = tempdir().unwrap();
        let prefix = Prefix::create(dir.path()).unwrap();
        let logger = CommandLogger::new(&prefix, false);
        logger.log(&finished_collector("echo quiet")).unwrap();
        assert!(logger.entries().unwrap().is_empty());
    }

    #[test]
    fn clear_removes_the_log() {
        let dir = tempdir().unwrap();
        let prefix = Prefix::create(dir.path()).unwrap();
        let logger = CommandLogger::new(&prefix, true);
        logger.log(&finished_collector("echo x")).unwrap();
        logger.clear().unwrap();
        assert!(logger.entries().unwrap().is_empty());
    }
}
