//! Interleaved per-task output
//!
//! Many packages restore and publish at once. Each gets a writer whose
//! lines carry a colored name prefix; every `log` call emits exactly one
//! whole line, so concurrent tasks never tear each other's output.

use console::Style;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Destination for finished lines
pub trait LineSink: Send + Sync {
    /// Write one complete line; implementations must not interleave
    /// partial lines from different callers.
    fn write_line(&self, line: &str);

    fn flush(&self) {}
}

/// Standard output, one locked write per line
#[derive(Debug, Default)]
pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn write_line(&self, line: &str) {
        let mut out = std::io::stdout().lock();
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        out.write_all(buf.as_bytes()).ok();
    }

    fn flush(&self) {
        std::io::stdout().lock().flush().ok();
    }
}

/// Collects lines in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl LineSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

fn palette() -> [Style; 6] {
    [
        Style::new().cyan(),
        Style::new().magenta(),
        Style::new().blue(),
        Style::new().yellow(),
        Style::new().green(),
        Style::new().red().bright(),
    ]
}

/// Hands out prefixed writers with round-robin colors
pub struct Interleaver {
    sink: Arc<dyn LineSink>,
    palette: Vec<Style>,
    next: AtomicUsize,
    color: bool,
}

impl Interleaver {
    pub fn new(sink: Arc<dyn LineSink>, color: bool) -> Self {
        Self {
            sink,
            palette: palette().to_vec(),
            next: AtomicUsize::new(0),
            color,
        }
    }

    /// Writer for one task; takes the next palette color
    pub fn register_task(&self, name: &str) -> TaskWriter {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.palette.len();
        let style = self.palette[index].clone().force_styling(self.color);
        TaskWriter {
            prefix: style.apply_to(format!("{}:", name)).to_string(),
            color_index: index,
            sink: Arc::clone(&self.sink),
        }
    }

    /// Restart the color rotation (phase boundary)
    pub fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }
}

/// Line writer bound to one task
pub struct TaskWriter {
    prefix: String,
    color_index: usize,
    sink: Arc<dyn LineSink>,
}

impl TaskWriter {
    pub fn log(&self, line: impl AsRef<str>) {
        self.sink
            .write_line(&format!("{} {}", self.prefix, line.as_ref()));
    }

    /// Palette slot this writer was given
    pub fn color_index(&self) -> usize {
        self.color_index
    }

    /// Flush and release the writer
    pub fn close(self) {
        self.sink.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interleaver() -> (Arc<MemorySink>, Interleaver) {
        let sink = Arc::new(MemorySink::default());
        let inter = Interleaver::new(sink.clone(), false);
        (sink, inter)
    }

    #[test]
    fn colors_rotate_and_wrap() {
        let (_, inter) = interleaver();
        let size = palette().len();
        let indexes: Vec<usize> = (0..size + 2)
            .map(|i| inter.register_task(&format!("pkg{i}")).color_index())
            .collect();

        assert_eq!(indexes[0], 0);
        assert_eq!(indexes[1], 1);
        assert_eq!(indexes[size], 0);
        assert_eq!(indexes[size + 1], 1);
    }

    #[test]
    fn reset_restarts_rotation() {
        let (_, inter) = interleaver();
        inter.register_task("a");
        inter.register_task("b");
        inter.reset();
        assert_eq!(inter.register_task("c").color_index(), 0);
    }

    #[test]
    fn lines_are_prefixed() {
        let (sink, inter) = interleaver();
        let writer = inter.register_task("@acme/ui");
        writer.log("cache hit (local)");
        writer.close();

        assert_eq!(sink.lines(), vec!["@acme/ui: cache hit (local)"]);
    }

    #[tokio::test]
    async fn concurrent_writers_emit_whole_lines() {
        let (sink, inter) = interleaver();
        let inter = Arc::new(inter);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let inter = Arc::clone(&inter);
                tokio::spawn(async move {
                    let writer = inter.register_task(&format!("pkg{i}"));
                    for n in 0..50 {
                        writer.log(format!("line {n}"));
                        tokio::task::yield_now().await;
                    }
                    writer.close();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let lines = sink.lines();
        assert_eq!(lines.len(), 400);
        for line in lines {
            let (name, rest) = line.split_once(": ").unwrap();
            assert!(name.starts_with("pkg"));
            assert!(rest.starts_with("line "));
        }
    }
}
