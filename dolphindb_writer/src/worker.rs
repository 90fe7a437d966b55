//! One buffer, one connection and one background task per worker.

use std::{sync::Arc, time::Duration};

use parking_lot::{Mutex, MutexGuard};
use tokio::{
    sync::Notify,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use dolphindb_client::{Connection, TableHandle};
use dolphindb_types::{Cell, ColumnarBatch};

use crate::{
    status::{StatusBoard, WorkerState, WorkerStatus},
    writer::InsertError,
};

#[derive(Debug)]
struct WorkerBuffer {
    state: WorkerState,
    pending: ColumnarBatch,
    closed: bool,
}

#[derive(Debug, Default)]
struct WorkerCounters {
    sent: usize,
    unsent: usize,
    failed: usize,
}

/// The part of a worker that inserting threads and the worker task share.
///
/// Lock order is `buffer` then `counters`. No lock is held across an await.
#[derive(Debug)]
pub(crate) struct WorkerShared {
    index: usize,
    batch_size: usize,
    buffer: Mutex<WorkerBuffer>,
    counters: Mutex<WorkerCounters>,
    failed: Mutex<Vec<ColumnarBatch>>,
    wake: Notify,
}

impl WorkerShared {
    pub(crate) fn new(index: usize, batch_size: usize, empty: ColumnarBatch) -> Self {
        Self {
            index,
            batch_size,
            buffer: Mutex::new(WorkerBuffer {
                state: WorkerState::Idle,
                pending: empty,
                closed: false,
            }),
            counters: Mutex::new(WorkerCounters::default()),
            failed: Mutex::new(Vec::new()),
            wake: Notify::new(),
        }
    }

    /// Buffer one checked row.
    pub(crate) fn push_row(&self, row: Vec<Cell>) -> Result<(), InsertError> {
        let mut buffer = self.buffer.lock();
        if buffer.closed {
            return Err(InsertError::Closed);
        }
        buffer.pending.push_row(row)?;
        self.buffered(&mut buffer, 1);
        Ok(())
    }

    /// Buffer each `(worker, batch)` part with its worker. Either every target worker is still
    /// open and all parts are buffered, or nothing is.
    ///
    /// Target buffers are locked in worker order.
    pub(crate) fn push_batches(
        workers: &[Arc<Self>],
        mut parts: Vec<(usize, ColumnarBatch)>,
    ) -> Result<(), InsertError> {
        parts.retain(|(_, batch)| !batch.is_empty());
        let mut buffers: Vec<Option<MutexGuard<'_, WorkerBuffer>>> = workers
            .iter()
            .enumerate()
            .map(|(index, worker)| {
                parts
                    .iter()
                    .any(|(target, _)| *target == index)
                    .then(|| worker.buffer.lock())
            })
            .collect();
        if buffers.iter().flatten().any(|buffer| buffer.closed) {
            return Err(InsertError::Closed);
        }

        for (index, batch) in parts {
            let rows = batch.num_rows();
            if let Some(buffer) = buffers[index].as_mut() {
                buffer.pending.append(batch)?;
                workers[index].buffered(buffer, rows);
            }
        }
        Ok(())
    }

    fn buffered(&self, buffer: &mut WorkerBuffer, rows: usize) {
        if buffer.state == WorkerState::Idle {
            buffer.state = WorkerState::Buffering;
        }
        self.counters.lock().unsent += rows;
        if buffer.pending.num_rows() >= self.batch_size {
            self.wake.notify_one();
        }
    }

    /// Take the pending rows for writing, unless there are none or a write is in flight.
    fn begin_flush(&self) -> Option<ColumnarBatch> {
        let mut buffer = self.buffer.lock();
        if buffer.state == WorkerState::Flushing || buffer.pending.is_empty() {
            return None;
        }
        buffer.state = WorkerState::Flushing;
        Some(buffer.pending.take())
    }

    fn finish_flush(&self, rows: usize, written: bool) {
        let mut buffer = self.buffer.lock();
        buffer.state = if buffer.pending.is_empty() {
            WorkerState::Idle
        } else {
            WorkerState::Buffering
        };
        let mut counters = self.counters.lock();
        counters.unsent -= rows;
        if written {
            counters.sent += rows;
        } else {
            counters.failed += rows;
        }
    }

    /// Stop accepting rows.
    pub(crate) fn close(&self) {
        self.buffer.lock().closed = true;
    }

    fn stop(&self) {
        self.buffer.lock().state = WorkerState::Stopped;
    }

    pub(crate) fn status(&self) -> WorkerStatus {
        let state = self.buffer.lock().state;
        let counters = self.counters.lock();
        WorkerStatus {
            state,
            sent_rows: counters.sent,
            unsent_rows: counters.unsent,
            failed_rows: counters.failed,
        }
    }

    /// Remove the batches that failed to write, then the rows still waiting to be written.
    pub(crate) fn take_unwritten(&self) -> Vec<ColumnarBatch> {
        let mut batches = std::mem::take(&mut *self.failed.lock());
        let mut buffer = self.buffer.lock();
        let pending = buffer.pending.take();
        if buffer.state == WorkerState::Buffering {
            buffer.state = WorkerState::Idle;
        }
        if !pending.is_empty() {
            self.counters.lock().unsent -= pending.num_rows();
            batches.push(pending);
        }
        batches
    }
}

/// The background task of one worker. It owns the worker's connection.
#[derive(Debug)]
pub(crate) struct Worker {
    shared: Arc<WorkerShared>,
    connection: Box<dyn Connection>,
    table: TableHandle,
    throttle: Duration,
    status: Arc<StatusBoard>,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<WorkerShared>,
        connection: Box<dyn Connection>,
        table: TableHandle,
        throttle: Duration,
        status: Arc<StatusBoard>,
    ) -> Self {
        Self {
            shared,
            connection,
            table,
            throttle,
            status,
        }
    }

    /// Write whenever the batch size is reached or the throttle interval elapses, until
    /// `shutdown` is cancelled. Then write what is left and close the connection.
    pub(crate) async fn run(mut self, shutdown: CancellationToken) {
        let mut interval =
            tokio::time::interval_at(Instant::now() + self.throttle, self.throttle);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let shared = Arc::clone(&self.shared);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = shared.wake.notified() => {
                    self.flush("batch_size").await;
                }
                _ = interval.tick() => {
                    self.flush("throttle").await;
                }
            }
        }

        // the buffer is closed before shutdown is signalled, so this terminates
        while self.flush("drain").await {}
        self.shared.stop();
        self.connection.close().await;
        debug!(worker = self.shared.index, "worker stopped");
    }

    /// Write the pending rows in one request. Returns false when there was nothing to write.
    async fn flush(&mut self, trigger: &'static str) -> bool {
        let Some(batch) = self.shared.begin_flush() else {
            return false;
        };
        let rows = batch.num_rows();
        debug!(worker = self.shared.index, rows, trigger, "writing batch");

        match self.connection.execute_write(&self.table, &batch).await {
            Ok(_) => self.shared.finish_flush(rows, true),
            Err(e) => {
                error!(%e, worker = self.shared.index, rows, table = %self.table, "failed to write batch");
                self.status.set_error(e.to_string());
                self.shared.failed.lock().push(batch);
                self.shared.finish_flush(rows, false);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use dolphindb_types::{ColumnData, ColumnDef, ColumnType, DataType, Schema};
    use pretty_assertions::assert_eq;

    use super::*;

    fn shared(batch_size: usize) -> WorkerShared {
        let schema = Schema::new(vec![ColumnDef::new("id", ColumnType::scalar(DataType::Int))]);
        WorkerShared::new(0, batch_size, ColumnarBatch::empty_for(&schema, 0).unwrap())
    }

    #[test]
    fn flush_cycle() {
        let shared = shared(10);
        assert_eq!(shared.status().state, WorkerState::Idle);
        assert!(shared.begin_flush().is_none());

        shared.push_row(vec![Cell::I32(1)]).unwrap();
        shared.push_row(vec![Cell::I32(2)]).unwrap();
        assert_eq!(
            shared.status(),
            WorkerStatus {
                state: WorkerState::Buffering,
                sent_rows: 0,
                unsent_rows: 2,
                failed_rows: 0,
            }
        );

        let batch = shared.begin_flush().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(shared.status().state, WorkerState::Flushing);
        // a second trigger while flushing is skipped
        shared.push_row(vec![Cell::I32(3)]).unwrap();
        assert!(shared.begin_flush().is_none());

        shared.finish_flush(2, true);
        assert_eq!(
            shared.status(),
            WorkerStatus {
                state: WorkerState::Buffering,
                sent_rows: 2,
                unsent_rows: 1,
                failed_rows: 0,
            }
        );
    }

    #[test]
    fn unwritten_rows_come_back_failed_first() {
        let shared = shared(10);
        shared.push_row(vec![Cell::I32(1)]).unwrap();
        let failed = shared.begin_flush().unwrap();
        shared.failed.lock().push(failed);
        shared.finish_flush(1, false);
        shared.push_row(vec![Cell::I32(2)]).unwrap();

        let unwritten = shared.take_unwritten();
        assert_eq!(
            unwritten,
            vec![
                ColumnarBatch::new(vec![ColumnData::I32(vec![1])]).unwrap(),
                ColumnarBatch::new(vec![ColumnData::I32(vec![2])]).unwrap(),
            ]
        );
        let status = shared.status();
        assert_eq!(status.state, WorkerState::Idle);
        assert_eq!(status.unsent_rows, 0);
        assert_eq!(status.failed_rows, 1);
        assert!(shared.take_unwritten().is_empty());
    }

    #[test]
    fn closed_buffer_rejects_rows() {
        let shared = shared(10);
        shared.close();
        assert!(matches!(
            shared.push_row(vec![Cell::I32(1)]),
            Err(InsertError::Closed)
        ));
        let batch = ColumnarBatch::new(vec![ColumnData::I32(vec![1])]).unwrap();
        assert!(matches!(
            WorkerShared::push_batches(&[Arc::new(shared)], vec![(0, batch)]),
            Err(InsertError::Closed)
        ));
    }

    #[test]
    fn batches_for_several_workers_are_all_or_nothing() {
        let workers = vec![Arc::new(shared(10)), Arc::new(shared(10))];
        let part = |ids: Vec<i32>| ColumnarBatch::new(vec![ColumnData::I32(ids)]).unwrap();

        WorkerShared::push_batches(&workers, vec![(0, part(vec![1])), (1, part(vec![2, 3]))])
            .unwrap();
        assert_eq!(workers[0].status().unsent_rows, 1);
        assert_eq!(workers[1].status().unsent_rows, 2);

        workers[1].close();
        assert!(matches!(
            WorkerShared::push_batches(&workers, vec![(0, part(vec![4])), (1, part(vec![5]))]),
            Err(InsertError::Closed)
        ));
        assert_eq!(workers[0].status().unsent_rows, 1);
        assert_eq!(workers[1].status().unsent_rows, 2);

        // a closed worker that receives nothing does not block the others
        WorkerShared::push_batches(&workers, vec![(0, part(vec![6])), (1, part(vec![]))])
            .unwrap();
        assert_eq!(workers[0].status().unsent_rows, 2);
    }

    #[test_log::test(tokio::test)]
    async fn full_buffer_wakes_the_task() {
        let shared = shared(2);
        shared.push_row(vec![Cell::I32(1)]).unwrap();
        shared.push_row(vec![Cell::I32(2)]).unwrap();
        tokio::time::timeout(Duration::from_secs(1), shared.wake.notified())
            .await
            .unwrap();
    }
}
