use std::{
    fmt::Display,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;

/// Where a worker is in its write cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkerState {
    /// Nothing buffered.
    #[default]
    Idle,
    /// Rows buffered, waiting for the batch size or the throttle interval.
    Buffering,
    /// A write is in flight.
    Flushing,
    /// Drained; the connection is closed.
    Stopped,
}

impl Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Buffering => "buffering",
            Self::Flushing => "flushing",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Row counters of one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub sent_rows: usize,
    pub unsent_rows: usize,
    pub failed_rows: usize,
}

/// A snapshot of a writer's progress.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStatus {
    /// Message of the most recent failed write, if any.
    pub error_message: Option<String>,
    /// Whether the writer has been drained.
    pub is_exit: bool,
    pub sent_rows: usize,
    pub unsent_rows: usize,
    pub failed_rows: usize,
    pub workers: Vec<WorkerStatus>,
}

impl WriterStatus {
    pub(crate) fn from_workers(
        workers: Vec<WorkerStatus>,
        error_message: Option<String>,
        is_exit: bool,
    ) -> Self {
        Self {
            error_message,
            is_exit,
            sent_rows: workers.iter().map(|w| w.sent_rows).sum(),
            unsent_rows: workers.iter().map(|w| w.unsent_rows).sum(),
            failed_rows: workers.iter().map(|w| w.failed_rows).sum(),
            workers,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error_message.is_some()
    }
}

impl Display for WriterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "errMsg         : {}", self.error_message.as_deref().unwrap_or(""))?;
        writeln!(f, "isExit         : {}", self.is_exit)?;
        writeln!(f, "sentRows       : {}", self.sent_rows)?;
        writeln!(f, "unsentRows     : {}", self.unsent_rows)?;
        writeln!(f, "sendFailedRows : {}", self.failed_rows)?;
        writeln!(f, "workers        :")?;
        writeln!(f, "\tid\tstate\tsentRows\tunsentRows\tsendFailedRows")?;
        for (id, worker) in self.workers.iter().enumerate() {
            writeln!(
                f,
                "\t{id}\t{}\t{}\t{}\t{}",
                worker.state, worker.sent_rows, worker.unsent_rows, worker.failed_rows
            )?;
        }
        Ok(())
    }
}

/// Writer-wide status shared by all workers: the latest error and the exit flag.
#[derive(Debug, Default)]
pub(crate) struct StatusBoard {
    error_message: Mutex<Option<String>>,
    exited: AtomicBool,
}

impl StatusBoard {
    pub(crate) fn set_error(&self, message: String) {
        *self.error_message.lock() = Some(message);
    }

    pub(crate) fn error(&self) -> Option<String> {
        self.error_message.lock().clone()
    }

    /// Mark the writer as exited, returning whether it already was.
    pub(crate) fn set_exited(&self) -> bool {
        self.exited.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }
}
