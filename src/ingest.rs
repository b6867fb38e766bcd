//! Cleaned retail transaction loading.
//!
//! Input rows are produced by the upstream cleaning step: no missing
//! CustomerID, no cancellations, strictly positive Quantity and UnitPrice.
//! Those invariants are consumed here, not re-checked.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const REQUIRED_COLUMNS: [&str; 7] = [
    "CustomerID",
    "InvoiceNo",
    "InvoiceDate",
    "StockCode",
    "Quantity",
    "UnitPrice",
    "TotalPrice",
];

// Timestamp layouts seen in cleaned exports of the retail dataset.
const INVOICE_DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
];

/// One cleaned line item. `total_price` is `quantity * unit_price`,
/// precomputed upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub customer_id: i64,
    pub invoice_no: String,
    pub invoice_date: NaiveDateTime,
    pub stock_code: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column '{column}' in transaction header")]
    MissingColumn { column: &'static str },
    #[error("failed to parse field {field} value '{value}' at record {record}")]
    ParseField {
        field: &'static str,
        value: String,
        record: u64,
    },
}

#[derive(Debug)]
struct ColumnIndices {
    customer_id: usize,
    invoice_no: usize,
    invoice_date: usize,
    stock_code: usize,
    quantity: usize,
    unit_price: usize,
    total_price: usize,
}

/// Loads the cleaned transaction table. Columns are addressed by header name,
/// so input column order is free.
pub fn load_transactions(path: &Path) -> Result<Vec<Transaction>, IngestError> {
    info!(
        component = "ingest",
        event = "ingest.load.start",
        path = %path.display()
    );

    let file = std::fs::File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers()?.clone();
    let indices = resolve_columns(&headers)?;

    let mut transactions = Vec::new();
    let mut record_no = 0u64;
    for record in reader.records() {
        let record = record?;
        record_no += 1;
        transactions.push(parse_transaction(&record, &indices, record_no)?);
    }

    let (first_date, last_date) = date_span(&transactions);
    info!(
        component = "ingest",
        event = "ingest.load.finish",
        path = %path.display(),
        rows = transactions.len(),
        first_date = ?first_date,
        last_date = ?last_date
    );

    Ok(transactions)
}

fn resolve_columns(headers: &StringRecord) -> Result<ColumnIndices, IngestError> {
    let index_of = |column: &'static str| -> Result<usize, IngestError> {
        headers
            .iter()
            .position(|name| name == column)
            .ok_or(IngestError::MissingColumn { column })
    };

    Ok(ColumnIndices {
        customer_id: index_of(REQUIRED_COLUMNS[0])?,
        invoice_no: index_of(REQUIRED_COLUMNS[1])?,
        invoice_date: index_of(REQUIRED_COLUMNS[2])?,
        stock_code: index_of(REQUIRED_COLUMNS[3])?,
        quantity: index_of(REQUIRED_COLUMNS[4])?,
        unit_price: index_of(REQUIRED_COLUMNS[5])?,
        total_price: index_of(REQUIRED_COLUMNS[6])?,
    })
}

fn parse_transaction(
    record: &StringRecord,
    indices: &ColumnIndices,
    record_no: u64,
) -> Result<Transaction, IngestError> {
    Ok(Transaction {
        customer_id: parse_i64(record, indices.customer_id, "CustomerID", record_no)?,
        invoice_no: field(record, indices.invoice_no).to_string(),
        invoice_date: parse_invoice_date(record, indices.invoice_date, record_no)?,
        stock_code: field(record, indices.stock_code).to_string(),
        quantity: parse_i64(record, indices.quantity, "Quantity", record_no)?,
        unit_price: parse_f64(record, indices.unit_price, "UnitPrice", record_no)?,
        total_price: parse_f64(record, indices.total_price, "TotalPrice", record_no)?,
    })
}

fn field<'r>(record: &'r StringRecord, idx: usize) -> &'r str {
    record.get(idx).unwrap_or_default()
}

fn parse_i64(
    record: &StringRecord,
    idx: usize,
    name: &'static str,
    record_no: u64,
) -> Result<i64, IngestError> {
    let raw = field(record, idx);
    // Cleaned exports sometimes carry integer IDs as "17850.0".
    if let Ok(value) = raw.parse::<i64>() {
        return Ok(value);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.fract() == 0.0)
        .map(|value| value as i64)
        .ok_or_else(|| IngestError::ParseField {
            field: name,
            value: raw.to_string(),
            record: record_no,
        })
}

fn parse_f64(
    record: &StringRecord,
    idx: usize,
    name: &'static str,
    record_no: u64,
) -> Result<f64, IngestError> {
    let raw = field(record, idx);
    raw.parse::<f64>().map_err(|_| IngestError::ParseField {
        field: name,
        value: raw.to_string(),
        record: record_no,
    })
}

fn parse_invoice_date(
    record: &StringRecord,
    idx: usize,
    record_no: u64,
) -> Result<NaiveDateTime, IngestError> {
    let raw = field(record, idx);
    for format in INVOICE_DATE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(parsed);
        }
        if let Ok(parsed) = chrono::NaiveDate::parse_from_str(raw, format) {
            if let Some(midnight) = parsed.and_hms_opt(0, 0, 0) {
                return Ok(midnight);
            }
        }
    }
    Err(IngestError::ParseField {
        field: "InvoiceDate",
        value: raw.to_string(),
        record: record_no,
    })
}

fn date_span(transactions: &[Transaction]) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
    let first = transactions.iter().map(|t| t.invoice_date).min();
    let last = transactions.iter().map(|t| t.invoice_date).max();
    (first, last)
}
