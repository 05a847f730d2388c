//! Output capability used by the printing primitives.

use std::io::Write;
use std::sync::Mutex;

pub trait Output: Send + Sync {
    fn write_line(&self, line: &str);
}

pub struct StdoutOutput;

impl Output for StdoutOutput {
    fn write_line(&self, line: &str) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{line}");
    }
}

/// Collects output in memory.
#[derive(Default)]
pub struct BufferOutput {
    buf: Mutex<String>,
}

impl BufferOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.buf.lock() {
            Ok(buf) => buf.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn take(&self) -> String {
        match self.buf.lock() {
            Ok(mut buf) => std::mem::take(&mut *buf),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Output for BufferOutput {
    fn write_line(&self, line: &str) {
        let mut buf = match self.buf.lock() {
            Ok(buf) => buf,
            Err(poisoned) => poisoned.into_inner(),
        };
        buf.push_str(line);
        buf.push('\n');
    }
}

impl<T: Output + ?Sized> Output for std::sync::Arc<T> {
    fn write_line(&self, line: &str) {
        (**self).write_line(line)
    }
}
