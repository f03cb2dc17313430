//! Build context carrying the log and the per-stage timers of a generation run
//!
//! Every builder owns its own context, so concurrent builds never share state. Entries
//! are kept for later inspection and forwarded to the `log` facade as they are recorded.

use std::collections::HashMap;
use std::time::Duration;
use web_time::Instant;

/// Severity of a context message
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

/// Pipeline stages that can be timed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerCategory {
    /// Whole tile build
    Total,
    Rasterization,
    Filtering,
    CompactHeightfield,
    Erosion,
    DistanceField,
    Regions,
    Contours,
    PolyMesh,
    DetailMesh,
    /// Tile data serialization
    Serialization,
}

/// A recorded message
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: Instant,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default)]
struct TimerEntry {
    duration: Duration,
    count: usize,
}

/// Log and timer sink for one generation run
#[derive(Debug)]
pub struct BuildContext {
    logs: Vec<LogEntry>,
    active_timers: HashMap<TimerCategory, Instant>,
    timers: HashMap<TimerCategory, TimerEntry>,
    min_log_level: LogLevel,
    max_log_entries: usize,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildContext {
    pub fn new() -> Self {
        Self {
            logs: Vec::new(),
            active_timers: HashMap::new(),
            timers: HashMap::new(),
            min_log_level: LogLevel::Info,
            max_log_entries: 1000,
        }
    }

    /// Sets the minimum level of recorded entries
    ///
    /// Forwarding to `log` is unaffected, the logger applies its own filter.
    pub fn set_log_level(&mut self, level: LogLevel) {
        self.min_log_level = level;
    }

    /// Sets how many entries are retained, oldest entries are dropped first
    pub fn set_max_log_entries(&mut self, max_entries: usize) {
        self.max_log_entries = max_entries;
    }

    pub fn log_debug(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message.into());
    }

    pub fn log_info(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Info, message.into());
    }

    pub fn log_warning(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message.into());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.log(LogLevel::Error, message.into());
    }

    fn log(&mut self, level: LogLevel, message: String) {
        match level {
            LogLevel::Debug => log::debug!("{}", message),
            LogLevel::Info => log::info!("{}", message),
            LogLevel::Warning => log::warn!("{}", message),
            LogLevel::Error => log::error!("{}", message),
        }

        if level < self.min_log_level {
            return;
        }
        self.logs.push(LogEntry {
            level,
            timestamp: Instant::now(),
            message,
        });
        if self.logs.len() > self.max_log_entries {
            let excess = self.logs.len() - self.max_log_entries;
            self.logs.drain(..excess);
        }
    }

    pub fn start_timer(&mut self, category: TimerCategory) {
        self.active_timers.insert(category, Instant::now());
    }

    /// Stops a running timer and adds the elapsed time to the stage total
    pub fn stop_timer(&mut self, category: TimerCategory) {
        if let Some(start) = self.active_timers.remove(&category) {
            let entry = self.timers.entry(category).or_default();
            entry.duration += start.elapsed();
            entry.count += 1;
        }
    }

    /// Accumulated duration of a stage, `None` if it never completed
    pub fn timer_duration(&self, category: TimerCategory) -> Option<Duration> {
        self.timers.get(&category).map(|t| t.duration)
    }

    /// Number of completed runs of a stage timer
    pub fn timer_count(&self, category: TimerCategory) -> usize {
        self.timers.get(&category).map_or(0, |t| t.count)
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn logs_by_level(&self, level: LogLevel) -> impl Iterator<Item = &LogEntry> {
        self.logs.iter().filter(move |e| e.level == level)
    }

    /// Clears logs and timers
    pub fn reset(&mut self) {
        self.logs.clear();
        self.active_timers.clear();
        self.timers.clear();
    }

    /// Logs the completed stage timers at debug level, slowest first
    pub fn log_timer_summary(&mut self) {
        let mut sorted: Vec<_> = self.timers.iter().map(|(c, t)| (*c, *t)).collect();
        sorted.sort_by(|a, b| b.1.duration.cmp(&a.1.duration).then(a.0.cmp(&b.0)));
        for (category, entry) in sorted {
            self.log_debug(format!(
                "{:20} {:8.2}ms ({} runs)",
                format!("{:?}", category),
                entry.duration.as_secs_f64() * 1000.0,
                entry.count
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_log_level_filtering() {
        let mut context = BuildContext::new();
        context.set_log_level(LogLevel::Warning);

        context.log_debug("debug");
        context.log_info("info");
        context.log_warning("warning");
        context.log_error("error");

        assert_eq!(context.logs().len(), 2);
        assert_eq!(context.logs()[0].level, LogLevel::Warning);
        assert_eq!(context.logs_by_level(LogLevel::Error).count(), 1);
    }

    #[test]
    fn test_timer_accumulation() {
        let mut context = BuildContext::new();
        for _ in 0..3 {
            context.start_timer(TimerCategory::Filtering);
            thread::sleep(Duration::from_millis(2));
            context.stop_timer(TimerCategory::Filtering);
        }
        assert_eq!(context.timer_count(TimerCategory::Filtering), 3);
        assert!(context.timer_duration(TimerCategory::Filtering).unwrap() >= Duration::from_millis(6));
        assert!(context.timer_duration(TimerCategory::Contours).is_none());
    }

    #[test]
    fn test_stop_without_start_is_ignored() {
        let mut context = BuildContext::new();
        context.stop_timer(TimerCategory::Total);
        assert_eq!(context.timer_count(TimerCategory::Total), 0);
    }

    #[test]
    fn test_max_log_entries() {
        let mut context = BuildContext::new();
        context.set_max_log_entries(3);
        for i in 0..5 {
            context.log_info(format!("message {}", i));
        }
        assert_eq!(context.logs().len(), 3);
        assert_eq!(context.logs()[2].message, "message 4");
    }

    #[test]
    fn test_reset() {
        let mut context = BuildContext::new();
        context.log_info("message");
        context.start_timer(TimerCategory::Total);
        context.stop_timer(TimerCategory::Total);
        context.reset();
        assert!(context.logs().is_empty());
        assert!(context.timer_duration(TimerCategory::Total).is_none());
    }
}
