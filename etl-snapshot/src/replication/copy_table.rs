use futures::StreamExt;
use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownResult, is_shutdown_pending};
use crate::concurrency::stream::CancellableStream;
use crate::concurrency::task::StreamExit;
use crate::destination::Destination;
use crate::error::{ErrorKind, EtlResult};
#[cfg(feature = "failpoints")]
use crate::failpoints::{COPY_TABLE__AFTER_BATCH_SENT, etl_fail_point};
use crate::metrics::{
    CATEGORY, COPY_PHASE, ETL_COPY_ERRORS_TOTAL, ETL_COPY_PHASE_DURATION_SECONDS,
    ETL_ROWS_COPIED_TOTAL, PHASE, STREAM_ROWS_ERROR, TABLE,
};
use crate::replication::CopyContext;
use crate::replication::fast_forward::fast_forward;
use crate::source::{LogStreamer, RowStreamRequest, SnapshotSource};
use crate::state::table::TableCopyRule;
use crate::store::checkpoint::CheckpointStore;
use crate::types::{
    BeginEvent, ChangeEvent, CommitEvent, Field, FieldEvent, KeyColumn, LastPkEvent, LogPosition,
    MarkerEvent, RowChange, RowEvent, SnapshotBatch, TableKey, TableRow,
};

/// Outcome of a table copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyTableResult {
    /// Every row of the table was copied and the table was marked complete.
    ///
    /// A table without rows leaves the transaction opened by its FIELD event open. Whatever is
    /// emitted next, such as the catch-up before the next table, lands in that transaction until
    /// the next batch commits it.
    Completed,
    /// The copy was shut down, the table stays pending at its last checkpoint.
    Stopped,
}

enum BatchOutcome {
    Continue,
    Stopped,
}

/// Copies the snapshot of `table_name`, resuming after its checkpoint.
///
/// Each batch with rows is emitted as one transaction of ROW events closed by a LASTPK event
/// with the batch's last key and a COMMIT. The checkpoint is persisted only after the
/// destination accepted the whole transaction. The first batch of the read is preceded by a
/// FIELD event and, when the snapshot was read at a position after the tracked one, by a
/// fast-forward of the change log up to the snapshot position.
pub async fn copy_table<L, S, C, D>(
    ctx: &CopyContext<L, S, C, D>,
    table_name: &str,
) -> EtlResult<CopyTableResult>
where
    L: LogStreamer,
    S: SnapshotSource,
    C: CheckpointStore,
    D: Destination + Clone + Send + Sync + 'static,
{
    let started = Instant::now();

    let result = run_copy_table(ctx, table_name).await;

    histogram!(ETL_COPY_PHASE_DURATION_SECONDS, PHASE => COPY_PHASE)
        .record(started.elapsed().as_secs_f64());

    result
}

async fn run_copy_table<L, S, C, D>(
    ctx: &CopyContext<L, S, C, D>,
    table_name: &str,
) -> EtlResult<CopyTableResult>
where
    L: LogStreamer,
    S: SnapshotSource,
    C: CheckpointStore,
    D: Destination + Clone + Send + Sync + 'static,
{
    let Some(rule) = ctx.rules.get(table_name) else {
        bail!(
            ErrorKind::MissingTableRule,
            "No copy rule found for the table",
            format!("table '{table_name}' has no copy rule")
        );
    };

    let last_key = ctx.tracker.last_key(table_name).await;
    info!(
        table_name,
        filter = ?rule.filter,
        last_key = ?last_key.as_ref().map(ToString::to_string),
        "starting table copy"
    );

    if ctx.config.emit_copy_markers {
        let marker = ChangeEvent::Marker(MarkerEvent {
            origin: ctx.origin.clone(),
            message: format!("Copy Start {table_name}"),
        });
        ctx.destination.write_events(vec![marker]).await?;
    }

    let outcome = match stream_table(ctx, table_name, rule, last_key).await {
        Ok(outcome) => outcome,
        Err(err) => {
            counter!(ETL_COPY_ERRORS_TOTAL, CATEGORY => STREAM_ROWS_ERROR).increment(1);
            return Err(err);
        }
    };

    let last_key = ctx.tracker.last_key(table_name).await;
    let last_key = last_key.as_ref().map(ToString::to_string);
    if matches!(outcome, BatchOutcome::Stopped) || is_shutdown_pending(&ctx.shutdown_rx) {
        info!(table_name, ?last_key, "table copy stopped");

        return Ok(CopyTableResult::Stopped);
    }

    let position = ctx.tracker.position().await;
    ctx.store.mark_table_complete(table_name, position).await?;
    ctx.tracker.mark_complete(table_name).await?;

    info!(table_name, ?last_key, "table copy finished");

    Ok(CopyTableResult::Completed)
}

async fn stream_table<L, S, C, D>(
    ctx: &CopyContext<L, S, C, D>,
    table_name: &str,
    rule: &TableCopyRule,
    last_key: Option<TableKey>,
) -> EtlResult<BatchOutcome>
where
    L: LogStreamer,
    S: SnapshotSource,
    C: CheckpointStore,
    D: Destination + Clone + Send + Sync + 'static,
{
    let request = RowStreamRequest {
        table_name: table_name.to_string(),
        filter: rule.filter.clone(),
        resume_after: last_key,
        batch: ctx.config.batch,
    };
    let stream = ctx.snapshot_source.stream_rows(request).await?;
    let mut stream = CancellableStream::wrap(stream, ctx.shutdown_rx.clone());

    while let Some(item) = stream.next().await {
        let batch = match item {
            ShutdownResult::Ok(batch) => batch?,
            ShutdownResult::Shutdown(()) => return Ok(BatchOutcome::Stopped),
        };

        if let BatchOutcome::Stopped = handle_batch(ctx, table_name, batch).await? {
            return Ok(BatchOutcome::Stopped);
        }
    }

    Ok(BatchOutcome::Continue)
}

async fn handle_batch<L, S, C, D>(
    ctx: &CopyContext<L, S, C, D>,
    table_name: &str,
    batch: SnapshotBatch,
) -> EtlResult<BatchOutcome>
where
    L: LogStreamer,
    S: SnapshotSource,
    C: CheckpointStore,
    D: Destination + Clone + Send + Sync + 'static,
{
    let state = ctx.tracker.table_state(table_name).await.unwrap_or_default();

    let (fields, key_fields) = match state.fields {
        Some(fields) => (fields, state.key_fields),
        None => {
            if !batch.has_fields() {
                bail!(
                    ErrorKind::MissingFieldEvent,
                    "The first snapshot batch of a table carries no fields",
                    format!("expected fields in the first batch of table '{table_name}'")
                );
            }

            if let BatchOutcome::Stopped = reconcile_position(ctx, &batch.position).await? {
                return Ok(BatchOutcome::Stopped);
            }

            let fields = batch.fields;
            let key_fields = batch.key_fields;
            ctx.tracker
                .set_fields(table_name, fields.clone(), key_fields.clone())
                .await;

            // A FIELD event opens a transaction.
            let field_event = ChangeEvent::Field(FieldEvent {
                origin: ctx.origin.clone(),
                table_name: table_name.to_string(),
                fields: fields.clone(),
            });
            ctx.destination
                .write_events(vec![begin_event(ctx), field_event])
                .await?;
            ctx.tracker.set_in_transaction(true).await;

            (fields, key_fields)
        }
    };

    if batch.rows.is_empty() {
        debug!(table_name, "snapshot batch has no rows");

        return Ok(BatchOutcome::Continue);
    }

    let Some(last_key_row) = batch.last_key else {
        bail!(
            ErrorKind::MissingLastKey,
            "A snapshot batch with rows carries no last key",
            format!("batch of table '{table_name}' has no last key")
        );
    };
    let last_key = build_table_key(table_name, &fields, &key_fields, last_key_row)?;

    let rows_count = batch.rows.len();
    let mut events = Vec::with_capacity(rows_count + 3);
    if !ctx.tracker.in_transaction().await {
        events.push(begin_event(ctx));
    }
    events.extend(batch.rows.into_iter().map(|row| {
        ChangeEvent::Row(RowEvent {
            origin: ctx.origin.clone(),
            table_name: table_name.to_string(),
            changes: vec![RowChange::insert(row)],
        })
    }));
    events.push(ChangeEvent::LastPk(LastPkEvent {
        origin: ctx.origin.clone(),
        table_name: table_name.to_string(),
        last_key: last_key.clone(),
    }));
    events.push(ChangeEvent::Commit(CommitEvent {
        origin: ctx.origin.clone(),
    }));

    debug!(table_name, rows_count, %last_key, "sending snapshot batch");
    ctx.destination.write_events(events).await?;
    ctx.tracker.set_in_transaction(false).await;
    counter!(ETL_ROWS_COPIED_TOTAL, TABLE => table_name.to_string()).increment(rows_count as u64);

    #[cfg(feature = "failpoints")]
    etl_fail_point(COPY_TABLE__AFTER_BATCH_SENT)?;

    let position = ctx.tracker.position().await;
    ctx.store
        .store_checkpoint(table_name, last_key.clone(), position)
        .await?;
    ctx.tracker.update_last_key(table_name, last_key).await;

    Ok(BatchOutcome::Continue)
}

/// Brings the tracked position to the position the snapshot was read at, fast-forwarding the
/// change log when the tracked position is behind it.
async fn reconcile_position<L, S, C, D>(
    ctx: &CopyContext<L, S, C, D>,
    snapshot_position: &str,
) -> EtlResult<BatchOutcome>
where
    L: LogStreamer,
    D: Destination + Clone + Send + Sync + 'static,
{
    let snapshot_position: LogPosition = snapshot_position.parse()?;
    let position = ctx.tracker.position().await;

    if !position.is_zero() && !position.at_least(&snapshot_position) {
        if fast_forward(ctx, snapshot_position).await? == StreamExit::Cancelled {
            return Ok(BatchOutcome::Stopped);
        }

        let landed = ctx.tracker.position().await;
        if landed != snapshot_position {
            bail!(
                ErrorKind::FastForwardPositionMismatch,
                "Fast-forward did not land on the snapshot position",
                format!(
                    "position after fast-forward was {landed} but the snapshot was read at {snapshot_position}"
                )
            );
        }
    } else {
        debug!(
            %position,
            %snapshot_position,
            "no fast-forward needed before the snapshot"
        );
    }

    ctx.tracker.set_position(snapshot_position).await;

    Ok(BatchOutcome::Continue)
}

fn begin_event<L, S, C, D>(ctx: &CopyContext<L, S, C, D>) -> ChangeEvent {
    ChangeEvent::Begin(BeginEvent {
        origin: ctx.origin.clone(),
    })
}

/// Builds the checkpoint key from the key values of a batch's last row.
fn build_table_key(
    table_name: &str,
    fields: &[Field],
    key_fields: &[Field],
    last_key_row: TableRow,
) -> EtlResult<TableKey> {
    if last_key_row.values.len() != key_fields.len() {
        bail!(
            ErrorKind::MissingKeyColumn,
            "The last key of a snapshot batch does not match the key fields",
            format!(
                "table '{table_name}' has {} key fields but the last key has {} values",
                key_fields.len(),
                last_key_row.values.len()
            )
        );
    }

    let mut columns = Vec::with_capacity(key_fields.len());
    for (key_field, value) in key_fields.iter().zip(last_key_row.values) {
        let Some(ordinal) = fields.iter().position(|field| field.name == key_field.name) else {
            bail!(
                ErrorKind::MissingKeyColumn,
                "A key field is not a field of the table",
                format!("key field '{}' not found in table '{table_name}'", key_field.name)
            );
        };

        columns.push(KeyColumn {
            field: key_field.clone(),
            ordinal,
            value,
        });
    }

    Ok(TableKey::new(columns))
}
