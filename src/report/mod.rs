//! User-facing progress output
//!
//! Phase headers, per-package task lines and the closing summary all go
//! through one [`Reporter`]. Diagnostics belong in `tracing`, not here.

mod context;
mod interleave;

pub use context::OutputContext;
pub use interleave::{Interleaver, LineSink, StdoutSink, TaskWriter};

#[cfg(test)]
pub use interleave::MemorySink;

use console::{style, StyledObject};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Elapsed time of a running phase
#[derive(Debug)]
pub struct PhaseTimer {
    title: String,
    started: Instant,
}

impl PhaseTimer {
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Renders progress for one command invocation
pub struct Reporter {
    ctx: OutputContext,
    sink: Arc<dyn LineSink>,
    tasks: Interleaver,
}

impl Reporter {
    pub fn new(ctx: OutputContext, sink: Arc<dyn LineSink>) -> Self {
        let tasks = Interleaver::new(Arc::clone(&sink), ctx.use_color());
        Self { ctx, sink, tasks }
    }

    /// Reporter writing to stdout
    pub fn stdout(ctx: OutputContext) -> Self {
        Self::new(ctx, Arc::new(StdoutSink))
    }

    fn paint<D>(&self, obj: StyledObject<D>) -> StyledObject<D> {
        obj.force_styling(self.ctx.use_color())
    }

    /// Start a phase: boundary line, header, fresh color rotation
    pub fn phase(&self, title: &str) -> PhaseTimer {
        self.tasks.reset();
        self.sink.write_line("");
        self.sink
            .write_line(&self.paint(style(format!("==> {}", title)).bold()).to_string());
        PhaseTimer {
            title: title.to_string(),
            started: Instant::now(),
        }
    }

    /// Close a phase with its elapsed time
    pub fn phase_done(&self, timer: PhaseTimer) {
        let line = format!(
            "{} finished in {}",
            timer.title,
            format_elapsed(timer.elapsed())
        );
        self.sink.write_line(&self.paint(style(line).dim()).to_string());
    }

    /// Writer for one package's lines in the current phase
    pub fn task(&self, name: &str) -> TaskWriter {
        self.tasks.register_task(name)
    }

    pub fn step_ok(&self, message: &str) {
        self.sink.write_line(&format!(
            "  {} {}",
            self.paint(style("[OK]").green()),
            message
        ));
    }

    pub fn step_warn(&self, message: &str) {
        self.sink.write_line(&format!(
            "  {} {}",
            self.paint(style("[WARN]").yellow()),
            message
        ));
    }

    pub fn step_info(&self, message: &str) {
        self.sink.write_line(&format!(
            "  {} {}",
            self.paint(style("[..]").cyan()),
            message
        ));
    }

    /// Final line of a command
    pub fn outro(&self, message: &str) {
        self.sink.write_line("");
        self.sink
            .write_line(&self.paint(style(message).green().bold()).to_string());
        self.sink.flush();
    }
}

/// `850ms`, `12.3s`, `2m05s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let millis = elapsed.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", elapsed.as_secs_f64())
    } else {
        let secs = elapsed.as_secs();
        format!("{}m{:02}s", secs / 60, secs % 60)
    }
}
