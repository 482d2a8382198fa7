use crate::config::TablePath;
use crate::record::{map_row, ReportRequest, RowOutcome};
use crate::report_client::ReportingApi;
use crate::warehouse::{insert_batch, InsertOutcome, Warehouse};
use chrono::NaiveDate;
use log::{error, info};
use std::sync::Arc;

/// What happened to a single day of the range.
#[derive(Debug, Clone, PartialEq)]
pub enum DayOutcome {
    /// A batch was handed to the warehouse, whatever the warehouse made of it.
    Loaded {
        mapped: usize,
        skipped: usize,
        insert: InsertOutcome,
    },
    /// The report came back but no row survived mapping, so nothing was inserted.
    Empty { skipped: usize },
    FetchFailed { message: String },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub days: usize,
    pub days_fetched: usize,
    pub days_failed: usize,
    pub rows_mapped: usize,
    pub rows_skipped: usize,
    pub rows_inserted: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &DayOutcome) {
        self.days += 1;
        match outcome {
            DayOutcome::Loaded {
                mapped,
                skipped,
                insert,
            } => {
                self.days_fetched += 1;
                self.rows_mapped += mapped;
                self.rows_skipped += skipped;
                if let InsertOutcome::Inserted(n) = insert {
                    self.rows_inserted += n;
                }
            }
            DayOutcome::Empty { skipped } => {
                self.days_fetched += 1;
                self.rows_skipped += skipped;
            }
            DayOutcome::FetchFailed { .. } => self.days_failed += 1,
        }
    }
}

/// Walks `start..=end` one calendar day at a time. Empty when `start > end`.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

/// The fetch/map/load cycle, holding the shared clients and the fixed destination.
pub struct Pipeline {
    reporting: Arc<dyn ReportingApi>,
    warehouse: Arc<dyn Warehouse>,
    property_id: String,
    table: TablePath,
}

impl Pipeline {
    pub fn new(
        reporting: Arc<dyn ReportingApi>,
        warehouse: Arc<dyn Warehouse>,
        property_id: &str,
        table: TablePath,
    ) -> Self {
        Pipeline {
            reporting,
            warehouse,
            property_id: property_id.to_string(),
            table,
        }
    }

    /// Processes every day in the range sequentially. Failed days are skipped, never retried.
    pub async fn run(&self, start: NaiveDate, end: NaiveDate) -> RunSummary {
        let mut summary = RunSummary::default();

        for day in days_inclusive(start, end) {
            let outcome = self.run_day(day).await;
            summary.record(&outcome);
        }

        info!(
            "Run finished: {} days ({} fetched, {} failed), {} rows mapped, {} skipped, {} inserted",
            summary.days,
            summary.days_fetched,
            summary.days_failed,
            summary.rows_mapped,
            summary.rows_skipped,
            summary.rows_inserted
        );

        summary
    }

    pub async fn run_day(&self, day: NaiveDate) -> DayOutcome {
        info!("Fetching data for {}", day);

        let request = ReportRequest::for_day(&self.property_id, day);
        let response = match self.reporting.run_report(&request).await {
            Ok(response) => response,
            Err(err) => {
                error!("Error fetching data for {}: {}", day, err);
                return DayOutcome::FetchFailed {
                    message: err.to_string(),
                };
            }
        };
        info!(
            "API response received for {} ({} rows)",
            day,
            response.row_count.unwrap_or(response.rows.len() as i64)
        );

        let mut batch = Vec::with_capacity(response.rows.len());
        let mut skipped = 0;
        for row in &response.rows {
            match map_row(row) {
                RowOutcome::Mapped(record) => batch.push(record),
                RowOutcome::Skipped(reason) => {
                    error!("Error processing row for {}: {}", day, reason);
                    skipped += 1;
                }
            }
        }

        if batch.is_empty() {
            return DayOutcome::Empty { skipped };
        }

        let insert = insert_batch(self.warehouse.as_ref(), &self.table, &batch).await;

        DayOutcome::Loaded {
            mapped: batch.len(),
            skipped,
            insert,
        }
    }
}
