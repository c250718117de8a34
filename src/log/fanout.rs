use super::LogSink;
use parking_lot::Mutex;
use std::sync::Arc;

/// Fans one stream of line-delimited output to any number of sinks.
///
/// Each registered sink receives every line. Sinks are deduplicated by
/// identity, so registering the same `Arc` twice has no effect.
pub struct FanoutLogger {
    sinks: Mutex<Vec<Arc<dyn LogSink>>>,
}

impl FanoutLogger {
    pub fn new() -> Self {
        Self {
            sinks: Mutex::new(Vec::new()),
        }
    }

    pub fn add_sink(&self, sink: Arc<dyn LogSink>) {
        let mut sinks = self.sinks.lock();
        if sinks.iter().any(|s| Arc::ptr_eq(s, &sink)) {
            return;
        }
        sinks.push(sink);
    }

    pub fn remove_sink(&self, sink: &Arc<dyn LogSink>) {
        let mut sinks = self.sinks.lock();
        if let Some(pos) = sinks.iter().position(|s| Arc::ptr_eq(s, sink)) {
            sinks.remove(pos);
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Splits `text` on newlines and delivers each line to every sink.
    pub fn write(&self, text: &str) {
        let trimmed = text.trim_matches('\n');
        if trimmed.is_empty() {
            return;
        }
        let sinks = self.sinks.lock().clone();
        for line in trimmed.split('\n') {
            for sink in &sinks {
                sink.log_line(line);
            }
        }
    }
}

impl Default for FanoutLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl LogSink for FanoutLogger {
    fn log_line(&self, line: &str) {
        self.write(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collector(Mutex<Vec<String>>);

    impl LogSink for Collector {
        fn log_line(&self, line: &str) {
            self.0.lock().push(line.to_string());
        }
    }

    #[test]
    fn lines_reach_every_sink() {
        let fanout = FanoutLogger::new();
        let a = Arc::new(Collector(Mutex::new(Vec::new())));
        let b = Arc::new(Collector(Mutex::new(Vec::new())));
        fanout.add_sink(a.clone());
        fanout.add_sink(b.clone());

        fanout.write("first\nsecond");
        assert_eq!(*a.0.lock(), vec!["first", "second"]);
        assert_eq!(*b.0.lock(), vec!["first", "second"]);
    }

    #[test]
    fn duplicate_sinks_are_ignored() {
        let fanout = FanoutLogger::new();
        let a = Arc::new(Collector(Mutex::new(Vec::new())));
        fanout.add_sink(a.clone());
        fanout.add_sink(a.clone());
        assert_eq!(fanout.sink_count(), 1);

        fanout.write("once");
        assert_eq!(a.0.lock().len(), 1);
    }

    #[test]
    fn removed_sink_stops_receiving() {
        let fanout = FanoutLogger::new();
        let a = Arc::new(Collector(Mutex::new(Vec::new())));
        let sink: Arc<dyn LogSink> = a.clone();
        fanout.add_sink(sink.clone());
        fanout.write("kept");
        fanout.remove_sink(&sink);
        fanout.write("dropped");
        assert_eq!(*a.0.lock(), vec!["kept"]);
    }
}
