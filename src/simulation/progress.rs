use super::day::DayReport;
use std::io::Write;
use std::sync::Mutex;

/// Where progress lines go
pub enum ProgressSink {
    Stdout,
    Silent,
    Buffer(Vec<String>),
}

struct ProgressState {
    sink: ProgressSink,
    day: u32,
    done: usize,
    total: usize,
    failed: usize,
    skipped: usize,
}

/// Console progress shared by all workers
///
/// Owns its own lock so interleaved workers never tear each other's lines.
/// Unrelated to the lock inside [`super::stats::Stats`].
pub struct Progress {
    state: Mutex<ProgressState>,
    every: usize,
}

impl Progress {
    pub fn new(sink: ProgressSink) -> Self {
        Self {
            state: Mutex::new(ProgressState {
                sink,
                day: 0,
                done: 0,
                total: 0,
                failed: 0,
                skipped: 0,
            }),
            every: 10,
        }
    }

    pub fn stdout() -> Self {
        Self::new(ProgressSink::Stdout)
    }

    pub fn silent() -> Self {
        Self::new(ProgressSink::Silent)
    }

    pub fn buffered() -> Self {
        Self::new(ProgressSink::Buffer(Vec::new()))
    }

    /// Print a line every `every` completed users
    pub fn every(mut self, every: usize) -> Self {
        self.every = every.max(1);
        self
    }

    pub fn start_day(&self, day: u32, days: u32, total: usize) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.day = day;
        state.done = 0;
        state.total = total;
        state.failed = 0;
        state.skipped = 0;
        emit(&mut state.sink, format!("== day {}/{} ({} users)", day, days, total));
    }

    /// Record one finished user for the current day.
    ///
    /// Failed and skipped actions accumulate until the next `start_day`.
    pub fn user_done(&self, report: &DayReport) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.done += 1;
        state.failed += report.failed;
        state.skipped += report.skipped;
        if state.done % self.every == 0 || state.done == state.total {
            let line = format!(
                "   day {}: {}/{} users, {} failed, {} skipped",
                state.day, state.done, state.total, state.failed, state.skipped
            );
            emit(&mut state.sink, line);
        }
    }

    pub fn message(&self, line: impl Into<String>) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        emit(&mut state.sink, line.into());
    }

    /// Lines captured by a buffered sink
    pub fn lines(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &state.sink {
            ProgressSink::Buffer(lines) => lines.clone(),
            _ => Vec::new(),
        }
    }
}

fn emit(sink: &mut ProgressSink, line: String) {
    match sink {
        ProgressSink::Stdout => {
            let mut out = std::io::stdout().lock();
            let _ = writeln!(out, "{}", line);
        }
        ProgressSink::Silent => {}
        ProgressSink::Buffer(lines) => lines.push(line),
    }
}
