//! Append-only span store (C4): a batched SQLite writer under WAL.
//!
//! Spans are accepted non-blockingly over a channel and flushed by a single
//! background task on whichever comes first: batch size, wall-clock
//! interval, or an explicit `flush()`/`shutdown()`. Concurrent readers (a
//! separate tail process reading the same file) get their own read-only
//! connections and are not blocked by the writer's busy-timeout.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use astrid_core::span::SpanRecord;
use rusqlite::{Connection, OpenFlags};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::TelemetryResult;

/// Default number of spans buffered before an eager flush.
pub const DEFAULT_BATCH_SIZE: usize = 64;
/// Default wall-clock interval between flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// Busy-timeout given to every connection so concurrent readers don't starve the writer.
const BUSY_TIMEOUT_MS: u32 = 5000;
/// Bounded retry count for a "database locked" flush before the batch is dropped.
const MAX_FLUSH_RETRIES: u32 = 5;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS spans (
    trace_id   TEXT NOT NULL,
    span_id    TEXT NOT NULL PRIMARY KEY,
    parent_id  TEXT,
    name       TEXT NOT NULL,
    start_ns   INTEGER NOT NULL,
    end_ns     INTEGER NOT NULL,
    attributes TEXT NOT NULL,
    status     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_spans_trace_id ON spans(trace_id);
CREATE INDEX IF NOT EXISTS idx_spans_start_ns ON spans(start_ns);
CREATE INDEX IF NOT EXISTS idx_spans_name ON spans(name);
";

fn open_writer_connection(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.busy_timeout(Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn insert_batch(conn: &mut Connection, batch: &[SpanRecord]) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT OR REPLACE INTO spans
                (trace_id, span_id, parent_id, name, start_ns, end_ns, attributes, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for span in batch {
            let attributes = serde_json::to_string(&span.attributes).unwrap_or_default();
            stmt.execute(rusqlite::params![
                span.trace_id,
                span.span_id,
                span.parent_id,
                span.name,
                span.start_ns,
                span.end_ns,
                attributes,
                span.status,
            ])?;
        }
    }
    tx.commit()
}

/// Flush one batch, retrying on "database is locked" with exponential backoff.
/// Drops the batch (logging a warning span) after exhausting retries.
async fn flush_with_retry(conn: &mut Connection, batch: &[SpanRecord]) {
    if batch.is_empty() {
        return;
    }

    let mut attempt: u32 = 0;
    loop {
        match insert_batch(conn, batch) {
            Ok(()) => return,
            Err(e) if is_locked(&e) && attempt < MAX_FLUSH_RETRIES => {
                let delay_ms = 50u64.saturating_mul(1u64 << attempt.min(10));
                tracing::warn!(attempt, delay_ms, "span store locked, retrying flush");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt = attempt.saturating_add(1);
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    dropped = batch.len(),
                    "dropping span batch after exhausting flush retries"
                );
                return;
            },
        }
    }
}

fn is_locked(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::DatabaseBusy
                || err.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

enum SinkMessage {
    Record(Box<SpanRecord>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the running span-store writer task.
pub struct SpanSink {
    tx: Option<mpsc::UnboundedSender<SinkMessage>>,
    worker: Option<JoinHandle<()>>,
}

impl SpanSink {
    /// Open (creating if absent) the span store at `path` and spawn its
    /// background batching writer.
    pub fn open(path: impl AsRef<Path>) -> TelemetryResult<Self> {
        Self::with_batching(path, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL)
    }

    /// Same as [`Self::open`] with explicit batch-size/interval thresholds.
    pub fn with_batching(
        path: impl AsRef<Path>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> TelemetryResult<Self> {
        let mut conn = open_writer_connection(path.as_ref())?;
        let (tx, mut rx) = mpsc::unbounded_channel::<SinkMessage>();

        let worker = tokio::spawn(async move {
            let mut buffer: Vec<SpanRecord> = Vec::with_capacity(batch_size);
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(SinkMessage::Record(span)) => {
                                buffer.push(*span);
                                if buffer.len() >= batch_size {
                                    flush_with_retry(&mut conn, &buffer).await;
                                    buffer.clear();
                                }
                            }
                            Some(SinkMessage::Flush(ack)) => {
                                flush_with_retry(&mut conn, &buffer).await;
                                buffer.clear();
                                let _ = ack.send(());
                            }
                            None => {
                                flush_with_retry(&mut conn, &buffer).await;
                                return;
                            }
                        }
                    }
                    _ = ticker.tick() => {
                        flush_with_retry(&mut conn, &buffer).await;
                        buffer.clear();
                    }
                }
            }
        });

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    /// Accept a span non-blockingly. Buffered until the next batch/interval/flush boundary.
    pub fn record(&self, span: SpanRecord) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(SinkMessage::Record(Box::new(span)));
        }
    }

    /// Force an immediate flush of whatever is currently buffered.
    pub async fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(SinkMessage::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Flush, then stop the background writer and wait for it to exit.
    ///
    /// Dropping the sender causes the background task's channel read to
    /// return `None`, at which point it flushes whatever remains buffered
    /// and exits.
    pub async fn shutdown(mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }
}

impl Drop for SpanSink {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

/// Read-only access to a span store, used by a separate tail/inspection process.
pub struct SpanReader {
    conn: Connection,
}

impl SpanReader {
    /// Open `path` read-only. Fails if the store doesn't already exist.
    pub fn open(path: impl AsRef<Path>) -> TelemetryResult<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(Duration::from_millis(u64::from(BUSY_TIMEOUT_MS)))?;
        Ok(Self { conn })
    }

    /// Fetch all spans belonging to `trace_id`, ordered by start time.
    pub fn spans_for_trace(&self, trace_id: &str) -> TelemetryResult<Vec<SpanRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT trace_id, span_id, parent_id, name, start_ns, end_ns, attributes, status
             FROM spans WHERE trace_id = ?1 ORDER BY start_ns",
        )?;
        let rows = stmt.query_map([trace_id], row_to_span)?;
        Ok(rows.filter_map(Result::ok).collect())
    }

    /// Fetch the `limit` most recent spans, most recent first.
    pub fn recent_spans(&self, limit: usize) -> TelemetryResult<Vec<SpanRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT trace_id, span_id, parent_id, name, start_ns, end_ns, attributes, status
             FROM spans ORDER BY start_ns DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], row_to_span)?;
        Ok(rows.filter_map(Result::ok).collect())
    }
}

fn row_to_span(row: &rusqlite::Row<'_>) -> rusqlite::Result<SpanRecord> {
    let attributes_json: String = row.get(6)?;
    let attributes: BTreeMap<String, String> =
        serde_json::from_str(&attributes_json).unwrap_or_default();
    Ok(SpanRecord {
        trace_id: row.get(0)?,
        span_id: row.get(1)?,
        parent_id: row.get(2)?,
        name: row.get(3)?,
        start_ns: row.get(4)?,
        end_ns: row.get(5)?,
        attributes,
        status: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_span(trace_id: &str, span_id: &str, start_ns: u64) -> SpanRecord {
        let mut attributes = BTreeMap::new();
        attributes.insert("tool".to_string(), "read_file".to_string());
        SpanRecord {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            parent_id: None,
            name: "tool.read_file".to_string(),
            start_ns,
            end_ns: start_ns.saturating_add(1_000_000),
            attributes,
            status: "ok".to_string(),
        }
    }

    #[tokio::test]
    async fn records_and_flushes_a_span() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spans.db");

        let sink = SpanSink::open(&path).unwrap();
        sink.record(sample_span("trace-1", "span-1", 100));
        sink.flush().await;
        sink.shutdown().await;

        let reader = SpanReader::open(&path).unwrap();
        let spans = reader.spans_for_trace("trace-1").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].span_id, "span-1");
        assert_eq!(spans[0].attributes.get("tool"), Some(&"read_file".to_string()));
    }

    #[tokio::test]
    async fn batch_size_triggers_eager_flush_without_explicit_flush_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spans.db");

        let sink = SpanSink::with_batching(&path, 2, Duration::from_secs(3600)).unwrap();
        sink.record(sample_span("trace-1", "a", 1));
        sink.record(sample_span("trace-1", "b", 2));

        // Give the background task a moment to process the second message
        // and cross the batch-size threshold.
        tokio::time::sleep(Duration::from_millis(50)).await;
        sink.shutdown().await;

        let reader = SpanReader::open(&path).unwrap();
        let spans = reader.spans_for_trace("trace-1").unwrap();
        assert_eq!(spans.len(), 2);
    }

    #[tokio::test]
    async fn recent_spans_orders_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spans.db");

        let sink = SpanSink::open(&path).unwrap();
        sink.record(sample_span("t", "old", 1));
        sink.record(sample_span("t", "new", 2));
        sink.flush().await;
        sink.shutdown().await;

        let reader = SpanReader::open(&path).unwrap();
        let spans = reader.recent_spans(10).unwrap();
        assert_eq!(spans[0].span_id, "new");
        assert_eq!(spans[1].span_id, "old");
    }
}
