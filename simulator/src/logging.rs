use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing_subscriber::fmt::writer::MakeWriter;

/// Tees formatted log lines to stdout and, optionally, a file.
#[derive(Clone)]
pub(crate) struct LogWriter {
    file: Option<Arc<Mutex<File>>>,
}

impl LogWriter {
    pub(crate) fn new(path: Option<PathBuf>) -> io::Result<Self> {
        let file = match path {
            Some(path) => Some(Arc::new(Mutex::new(File::create(path)?))),
            None => None,
        };
        Ok(Self { file })
    }
}

pub(crate) struct LogWriterGuard {
    file: Option<Arc<Mutex<File>>>,
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriterGuard {
            file: self.file.clone(),
        }
    }
}

impl LogWriterGuard {
    fn file(file: &Mutex<File>) -> MutexGuard<'_, File> {
        match file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Write for LogWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stdout().write_all(buf)?;
        if let Some(file) = &self.file {
            Self::file(file).write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &self.file {
            Self::file(file).flush()?;
        }
        Ok(())
    }
}

/// Keeps the first few step lines and a rolling tail, dumped when the oracle trips.
pub(crate) struct EventLog {
    head: Vec<String>,
    head_cap: usize,
    tail: VecDeque<String>,
    tail_cap: usize,
    dropped: u64,
}

impl EventLog {
    pub(crate) fn new(head_cap: usize, tail_cap: usize) -> Self {
        Self {
            head: Vec::with_capacity(head_cap),
            head_cap,
            tail: VecDeque::with_capacity(tail_cap),
            tail_cap,
            dropped: 0,
        }
    }

    pub(crate) fn record(&mut self, line: String) {
        tracing::debug!("{line}");
        if self.head.len() < self.head_cap {
            self.head.push(line);
            return;
        }
        if self.tail.len() == self.tail_cap {
            self.tail.pop_front();
            self.dropped += 1;
        }
        if self.tail_cap > 0 {
            self.tail.push_back(line);
        }
    }

    pub(crate) fn dump_failure(&self, reason: &str) {
        tracing::error!("oracle failure: {reason}");
        for line in &self.head {
            tracing::error!("  {line}");
        }
        if self.dropped > 0 {
            tracing::error!("  ... {} steps elided ...", self.dropped);
        }
        for line in &self.tail {
            tracing::error!("  {line}");
        }
    }
}
