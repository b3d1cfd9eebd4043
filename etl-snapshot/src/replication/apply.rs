use std::cmp::Ordering;

use metrics::gauge;
use tracing::debug;

use crate::concurrency::lag::LagEstimate;
use crate::destination::Destination;
use crate::error::EtlResult;
use crate::metrics::ETL_REPLICATION_LAG_SECONDS;
use crate::state::tracker::{CopyTracker, TableProgress};
use crate::types::{ChangeEvent, LogEntry};

/// Outcome of applying one log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Continue,
    /// The stop position was reached, the stream must end.
    StopReached,
}

/// Applies change log entries while a copy is in progress.
///
/// Changes of tables that are not copied yet are dropped, as are changes of the table being
/// copied whose key is after its checkpoint: those rows are delivered by the snapshot. When the
/// tracker has a stop position, entries beyond it are never applied.
#[derive(Debug, Clone)]
pub struct ApplyHandler<D> {
    destination: D,
    tracker: CopyTracker,
    lag: LagEstimate,
}

impl<D> ApplyHandler<D>
where
    D: Destination,
{
    pub fn new(destination: D, tracker: CopyTracker, lag: LagEstimate) -> Self {
        Self {
            destination,
            tracker,
            lag,
        }
    }

    pub async fn apply_entry(&self, entry: LogEntry) -> EtlResult<ApplyOutcome> {
        let stop_position = self.tracker.stop_position().await;
        if let Some(stop_position) = stop_position {
            if self.tracker.position().await.at_least(&stop_position) {
                return Ok(ApplyOutcome::StopReached);
            }

            if entry.position > stop_position {
                debug!(
                    position = %entry.position,
                    stop_position = %stop_position,
                    "log entry is beyond the stop position, not applying it"
                );

                return Ok(ApplyOutcome::StopReached);
            }
        }

        if !entry.is_heartbeat() {
            let events = self.filter_events(entry.events).await;
            if events.iter().any(carries_data) {
                self.destination.write_events(events).await?;
            }
        }

        let position = self.tracker.advance_position(entry.position).await;
        let lag = self.lag.record_from_timestamp(entry.timestamp);
        gauge!(ETL_REPLICATION_LAG_SECONDS).set(lag as f64);

        match stop_position {
            Some(stop_position) if position.at_least(&stop_position) => {
                Ok(ApplyOutcome::StopReached)
            }
            _ => Ok(ApplyOutcome::Continue),
        }
    }

    async fn filter_events(&self, events: Vec<ChangeEvent>) -> Vec<ChangeEvent> {
        let mut filtered = Vec::with_capacity(events.len());

        for event in events {
            match event {
                ChangeEvent::Row(mut row_event) => {
                    match self.tracker.progress(&row_event.table_name).await {
                        TableProgress::Untracked => {}
                        TableProgress::NotStarted => continue,
                        TableProgress::InProgress(last_key) => {
                            // Rows that can't be compared with the checkpoint are kept.
                            row_event.changes.retain(|change| {
                                change.identity().is_none_or(|row| {
                                    last_key.compare_row(row) != Some(Ordering::Greater)
                                })
                            });

                            if row_event.changes.is_empty() {
                                continue;
                            }
                        }
                    }

                    filtered.push(ChangeEvent::Row(row_event));
                }
                ChangeEvent::Field(field_event) => {
                    if self.tracker.progress(&field_event.table_name).await
                        == TableProgress::NotStarted
                    {
                        continue;
                    }

                    filtered.push(ChangeEvent::Field(field_event));
                }
                event => filtered.push(event),
            }
        }

        filtered
    }
}

fn carries_data(event: &ChangeEvent) -> bool {
    matches!(
        event,
        ChangeEvent::Row(_) | ChangeEvent::Field(_) | ChangeEvent::LastPk(_)
    )
}
