//! Per-unit logger with file and callback output.
//!
//! Each stitch unit gets its own logger that:
//! - Writes to a dedicated log file in the logs folder
//! - Forwards formatted lines to an optional callback
//! - Keeps the last tool output lines for failure reports

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogCallback, LogConfig, LogLevel, MessagePrefix};

/// Per-unit logger with dual output (file + callback).
pub struct UnitLogger {
    name: String,
    log_path: PathBuf,
    file_writer: Mutex<Option<BufWriter<File>>>,
    callback: Option<LogCallback>,
    config: LogConfig,
    /// Recent tool output, replayed when a step fails.
    tail_buffer: Mutex<VecDeque<String>>,
}

impl UnitLogger {
    /// Create a logger writing to `{log_dir}/{name}.log`.
    pub fn new(
        name: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LogCallback>,
    ) -> std::io::Result<Self> {
        let name = name.into();
        let log_dir = log_dir.as_ref();

        fs::create_dir_all(log_dir)?;
        let log_path = log_dir.join(format!("{}.log", sanitize_filename(&name)));
        let file = File::create(&log_path)?;

        let capacity = config.error_tail.max(1);
        Ok(Self {
            name,
            log_path,
            file_writer: Mutex::new(Some(BufWriter::new(file))),
            callback,
            config,
            tail_buffer: Mutex::new(VecDeque::with_capacity(capacity)),
        })
    }

    /// Logger that keeps the tail buffer and callback but writes no file.
    pub fn detached(name: impl Into<String>, config: LogConfig, callback: Option<LogCallback>) -> Self {
        let capacity = config.error_tail.max(1);
        Self {
            name: name.into(),
            log_path: PathBuf::new(),
            file_writer: Mutex::new(None),
            callback,
            config,
            tail_buffer: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Log file path (empty for detached loggers).
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        let formatted = self.format_message(message);
        self.output(&formatted);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Log an external command line.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Command.format(command));
    }

    /// Log a step marker.
    pub fn phase(&self, phase_name: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Phase.format(phase_name));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Record a line of external tool output.
    ///
    /// Always kept in the tail buffer; written through only when not compact.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        if self.config.error_tail > 0 {
            let mut buffer = self.tail_buffer.lock();
            if buffer.len() >= self.config.error_tail {
                buffer.pop_front();
            }
            buffer.push_back(line.to_string());
        }

        if self.config.compact {
            return;
        }

        let prefix = if is_stderr { "[stderr] " } else { "" };
        self.log(LogLevel::Debug, &format!("{}{}", prefix, line));
    }

    /// Write the tail buffer under a `[header/tail]` marker.
    pub fn show_tail(&self, header: &str) {
        let buffer = self.tail_buffer.lock();
        if buffer.is_empty() {
            return;
        }

        self.output(&self.format_message(&format!("[{}/tail]", header)));
        for line in buffer.iter() {
            self.output(&self.format_message(line));
        }
    }

    /// Forget buffered output, e.g. before the next tool starts.
    pub fn clear_tail(&self) {
        self.tail_buffer.lock().clear();
    }

    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writer.flush();
        }
    }

    /// Flush and release the log file.
    pub fn close(&self) {
        self.flush();
        *self.file_writer.lock() = None;
    }

    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, formatted: &str) {
        if let Some(ref mut writer) = *self.file_writer.lock() {
            let _ = writeln!(writer, "{}", formatted);
        }
        if let Some(ref callback) = self.callback {
            callback(formatted);
        }
    }
}

impl Drop for UnitLogger {
    fn drop(&mut self) {
        self.close();
    }
}

/// Replace characters that are unsafe in file names.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '#' | ' ' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn quiet() -> LogConfig {
        LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        }
    }

    #[test]
    fn creates_log_file() {
        let dir = tempdir().unwrap();
        let logger = UnitLogger::new("unit_001_REC001", dir.path(), quiet(), None).unwrap();

        assert!(logger.log_path().exists());
        assert!(logger.log_path().ends_with("unit_001_REC001.log"));
    }

    #[test]
    fn writes_to_file() {
        let dir = tempdir().unwrap();
        let logger = UnitLogger::new("u", dir.path(), quiet(), None).unwrap();

        logger.phase("Stitch");
        logger.command("stitcher --input a b");
        logger.flush();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("=== Stitch ==="));
        assert!(content.contains("$ stitcher --input a b"));
    }

    #[test]
    fn level_filters_debug() {
        let dir = tempdir().unwrap();
        let logger = UnitLogger::new("u", dir.path(), quiet(), None).unwrap();

        logger.debug("hidden");
        logger.info("shown");
        logger.flush();

        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(!content.contains("hidden"));
        assert!(content.contains("shown"));
    }

    #[test]
    fn calls_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = count.clone();
        let callback: LogCallback = Arc::new(move |_msg| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let logger = UnitLogger::detached("u", quiet(), Some(callback));
        logger.info("one");
        logger.warn("two");

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn compact_mode_keeps_output_in_tail_only() {
        let dir = tempdir().unwrap();
        let logger = UnitLogger::new("u", dir.path(), quiet(), None).unwrap();

        logger.output_line("frame 10/100", false);
        logger.flush();
        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(!content.contains("frame 10/100"));

        logger.show_tail("stitcher");
        logger.flush();
        let content = fs::read_to_string(logger.log_path()).unwrap();
        assert!(content.contains("[stitcher/tail]"));
        assert!(content.contains("frame 10/100"));
    }

    #[test]
    fn tail_buffer_maintains_limit() {
        let config = LogConfig {
            error_tail: 5,
            ..quiet()
        };
        let logger = UnitLogger::detached("u", config, None);

        for i in 0..10 {
            logger.output_line(&format!("Line {}", i), false);
        }

        let tail = logger.get_tail();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0], "Line 5");
        assert_eq!(tail[4], "Line 9");
    }

    #[test]
    fn sanitizes_filename() {
        assert_eq!(sanitize_filename("normal_name"), "normal_name");
        assert_eq!(sanitize_filename("has/slash"), "has_slash");
        assert_eq!(sanitize_filename("#1 REC"), "_1_REC");
    }
}
