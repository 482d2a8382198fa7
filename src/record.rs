use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dimensions requested from the reporting API. The row mapper reads them back by position.
pub const DIMENSIONS: [&str; 7] = [
    "date",
    "deviceCategory",
    "sessionCampaignId",
    "sessionCampaignName",
    "sessionSourceMedium",
    "transactionId",
    "eventName",
];

/// Metrics requested from the reporting API, in positional order.
pub const METRICS: [&str; 7] = [
    "ecommercePurchases",
    "sessions",
    "totalRevenue",
    "keyEvents:add_to_cart",
    "keyEvents:purchase",
    "keyEvents:begin_checkout",
    "eventValue",
];

/// Row ceiling for a single report. Rows past it are not paged in.
pub const ROW_LIMIT: i64 = 250_000;

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(skip)]
    pub property_id: String,
    pub date_ranges: Vec<DateRange>,
    pub dimensions: Vec<Named>,
    pub metrics: Vec<Named>,
    pub limit: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Named {
    pub name: String,
}

impl ReportRequest {
    /// Builds the fixed report query for a single day.
    pub fn for_day(property_id: &str, day: NaiveDate) -> Self {
        let day = day.format("%Y-%m-%d").to_string();

        ReportRequest {
            property_id: property_id.to_string(),
            date_ranges: vec![DateRange {
                start_date: day.clone(),
                end_date: day,
            }],
            dimensions: DIMENSIONS.iter().map(|name| named(name)).collect(),
            metrics: METRICS.iter().map(|name| named(name)).collect(),
            limit: ROW_LIMIT,
        }
    }
}

fn named(name: &str) -> Named {
    Named {
        name: name.to_string(),
    }
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    #[serde(default)]
    pub rows: Vec<Row>,
    #[serde(default)]
    pub row_count: Option<i64>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    #[serde(default)]
    pub dimension_values: Vec<Value>,
    #[serde(default)]
    pub metric_values: Vec<Value>,
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
pub struct Value {
    #[serde(default)]
    pub value: String,
}

#[cfg(test)]
impl Row {
    pub fn new(dimensions: &[&str], metrics: &[&str]) -> Self {
        let values = |items: &[&str]| -> Vec<Value> {
            items
                .iter()
                .map(|v| Value {
                    value: v.to_string(),
                })
                .collect()
        };

        Row {
            dimension_values: values(dimensions),
            metric_values: values(metrics),
        }
    }
}

/// One warehouse row. Field order matches the destination table.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub date: String,
    pub device: String,
    pub campaign_id: String,
    pub campaign_name: String,
    pub source_medium: String,
    pub transaction_id: String,
    pub event_name: String,
    pub ecommerce_purchases: i64,
    pub sessions: i64,
    pub total_revenue: f64,
    pub event_value: f64,
    pub event_add_to_cart: i64,
    pub event_purchase: i64,
    pub event_begin_checkout: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MissingDimension { index: usize },
    MissingMetric { index: usize },
    InvalidNumber { index: usize, value: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingDimension { index } => {
                write!(f, "dimension index {} out of range", index)
            }
            SkipReason::MissingMetric { index } => {
                write!(f, "metric index {} out of range", index)
            }
            SkipReason::InvalidNumber { index, value } => {
                write!(f, "metric {} has non-numeric value '{}'", index, value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Mapped(OutputRecord),
    Skipped(SkipReason),
}

/// Maps a positional report row onto a named record.
///
/// Metrics 3, 4 and 5 feed the add-to-cart, purchase and begin-checkout counts and metric 6
/// feeds `event_value`, following the request order in [`METRICS`]. Nothing checks that the
/// API kept that order; only out-of-range indices and unparsable numbers are caught.
pub fn map_row(row: &Row) -> RowOutcome {
    match try_map_row(row) {
        Ok(record) => RowOutcome::Mapped(record),
        Err(reason) => RowOutcome::Skipped(reason),
    }
}

fn try_map_row(row: &Row) -> Result<OutputRecord, SkipReason> {
    Ok(OutputRecord {
        date: dimension(row, 0)?,
        device: dimension(row, 1)?,
        campaign_id: dimension(row, 2)?,
        campaign_name: dimension(row, 3)?,
        source_medium: dimension(row, 4)?,
        transaction_id: dimension(row, 5)?,
        event_name: dimension(row, 6)?,
        ecommerce_purchases: int_metric(row, 0)?,
        sessions: int_metric(row, 1)?,
        total_revenue: float_metric(row, 2)?,
        event_value: float_metric(row, 6)?,
        event_add_to_cart: int_metric(row, 3)?,
        event_purchase: int_metric(row, 4)?,
        event_begin_checkout: int_metric(row, 5)?,
    })
}

fn dimension(row: &Row, index: usize) -> Result<String, SkipReason> {
    row.dimension_values
        .get(index)
        .map(|v| v.value.clone())
        .ok_or(SkipReason::MissingDimension { index })
}

fn metric(row: &Row, index: usize) -> Result<&str, SkipReason> {
    row.metric_values
        .get(index)
        .map(|v| v.value.trim())
        .ok_or(SkipReason::MissingMetric { index })
}

fn int_metric(row: &Row, index: usize) -> Result<i64, SkipReason> {
    let raw = metric(row, index)?;
    raw.parse::<i64>().map_err(|_| SkipReason::InvalidNumber {
        index,
        value: raw.to_string(),
    })
}

fn float_metric(row: &Row, index: usize) -> Result<f64, SkipReason> {
    let raw = metric(row, index)?;
    raw.parse::<f64>().map_err(|_| SkipReason::InvalidNumber {
        index,
        value: raw.to_string(),
    })
}
