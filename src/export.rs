//! Feature table and manifest serialization.
//!
//! No transformation logic lives here; rows are emitted in the schema's
//! column order and both outputs land on disk through a temp-file rename.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::features::{CustomerFeatureRow, FeatureSchema};

/// Audit trail for one pipeline run: which horizon produced which label
/// distribution. `total_features` excludes CustomerID and Churn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureManifest {
    pub total_customers: u64,
    pub total_features: u64,
    pub churn_rate: f64,
    pub training_cutoff: String,
    pub observation_end: String,
    pub schema_version: u32,
    pub schema_fingerprint: String,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid output path: {path}")]
    InvalidPath { path: PathBuf },
}

pub fn write_feature_table(
    path: &Path,
    schema: &FeatureSchema,
    rows: &[CustomerFeatureRow],
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let header: Vec<&str> = schema
        .columns
        .iter()
        .map(|column| column.name.as_str())
        .collect();
    writer.write_record(&header)?;

    for row in rows {
        writer.write_record(csv_record(row))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;
    write_atomic(path, &bytes)?;

    info!(
        component = "export",
        event = "export.table.written",
        path = %path.display(),
        rows = rows.len(),
        columns = schema.columns.len()
    );

    Ok(())
}

pub fn write_manifest(path: &Path, manifest: &FeatureManifest) -> Result<(), ExportError> {
    let bytes = serde_json::to_vec_pretty(manifest)?;
    write_atomic(path, &bytes)?;

    info!(
        component = "export",
        event = "export.manifest.written",
        path = %path.display(),
        total_customers = manifest.total_customers,
        churn_rate = manifest.churn_rate
    );

    Ok(())
}

fn csv_record(row: &CustomerFeatureRow) -> Vec<String> {
    let aggregates = &row.aggregates;
    let ratios = &row.ratios;
    vec![
        row.customer_id.to_string(),
        u8::from(row.churned).to_string(),
        aggregates.recency_days.to_string(),
        aggregates.frequency.to_string(),
        format_f64(aggregates.total_spent),
        format_f64(aggregates.avg_order_value),
        aggregates.total_items.to_string(),
        aggregates.unique_products.to_string(),
        aggregates.lifetime_days.to_string(),
        aggregates.purchases_last_30.to_string(),
        aggregates.purchases_last_60.to_string(),
        aggregates.purchases_last_90.to_string(),
        format_f64(ratios.avg_items_per_order),
        format_f64(ratios.avg_revenue_per_item),
        format_f64(ratios.orders_per_day),
        format_f64(ratios.revenue_per_day),
        format_f64(ratios.products_per_order),
        format_f64(ratios.items_per_product),
        format_f64(ratios.product_diversity_ratio),
        format_f64(ratios.recency_to_lifetime_ratio),
        format_f64(ratios.recent_30_to_60_ratio),
        format_f64(ratios.recent_60_to_90_ratio),
        format_f64(ratios.spend_per_order),
        format_f64(ratios.spend_per_product),
        format_f64(ratios.frequency_to_lifetime_ratio),
        format_f64(ratios.items_per_day),
    ]
}

// Shortest round-trip representation; deterministic across runs.
fn format_f64(value: f64) -> String {
    format!("{value}")
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| ExportError::InvalidPath {
            path: path.to_path_buf(),
        })?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}
