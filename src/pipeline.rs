//! End-to-end feature construction pipeline.
//!
//! A run is a pure function of the input table plus the configured horizon:
//! ingest, split at the cutoff, label, aggregate, derive, write. The feature
//! table lands before the manifest, so a failed run leaves no manifest
//! claiming outputs that do not exist.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use crate::export::{write_feature_table, write_manifest, ExportError, FeatureManifest};
use crate::features::{assemble_feature_rows, build_customer_aggregates, build_feature_schema};
use crate::ingest::{load_transactions, IngestError};
use crate::labeling::{churn_rate, label_churn};
use crate::windows::{split_at_cutoff, window_bounds};

/// Observation horizon subtracted from the latest transaction date.
///
/// Inherited policy: 120 days was chosen in the source project because it
/// lands the churn rate in a 25-38% band. Horizon selection by label
/// distribution is a known methodological risk; do not silently alter it.
pub const DEFAULT_HORIZON_DAYS: i64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub input_path: PathBuf,
    pub feature_table_path: PathBuf,
    pub manifest_path: PathBuf,
    pub horizon_days: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("data/processed/cleaned_transactions.csv"),
            feature_table_path: PathBuf::from("data/processed/customer_features.csv"),
            manifest_path: PathBuf::from("data/processed/feature_info.json"),
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline config: {0}")]
    InvalidConfig(String),
    #[error("input contains no transactions; cannot derive a cutoff")]
    EmptyInput,
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

pub fn run_pipeline(cfg: &PipelineConfig) -> Result<FeatureManifest, PipelineError> {
    validate_config(cfg)?;

    info!(
        component = "pipeline",
        event = "pipeline.run.start",
        input_path = %cfg.input_path.display(),
        horizon_days = cfg.horizon_days
    );

    let transactions = load_transactions(&cfg.input_path)?;
    let bounds = window_bounds(&transactions, cfg.horizon_days).ok_or(PipelineError::EmptyInput)?;
    let split = split_at_cutoff(transactions, &bounds);

    if split.training.is_empty() || split.observation.is_empty() {
        // Horizon at or beyond the data span. The run still completes; the
        // manifest churn rate is how downstream consumers detect this.
        warn!(
            component = "pipeline",
            event = "pipeline.window.degenerate",
            training_rows = split.training.len(),
            observation_rows = split.observation.len(),
            horizon_days = cfg.horizon_days
        );
    }

    let labels = label_churn(&split.training, &split.observation);
    let aggregates = build_customer_aggregates(&split.training, &bounds);
    let rows = assemble_feature_rows(&labels, aggregates);
    let schema = build_feature_schema(cfg.horizon_days);

    let manifest = FeatureManifest {
        total_customers: rows.len() as u64,
        total_features: (schema.columns.len() - 2) as u64,
        churn_rate: churn_rate(&labels),
        training_cutoff: bounds.training_cutoff.date().to_string(),
        observation_end: bounds.observation_end.date().to_string(),
        schema_version: schema.version,
        schema_fingerprint: schema.fingerprint.clone(),
    };

    write_feature_table(&cfg.feature_table_path, &schema, &rows)?;
    write_manifest(&cfg.manifest_path, &manifest)?;

    info!(
        component = "pipeline",
        event = "pipeline.run.finish",
        total_customers = manifest.total_customers,
        total_features = manifest.total_features,
        churn_rate = manifest.churn_rate,
        training_cutoff = %manifest.training_cutoff,
        observation_end = %manifest.observation_end
    );

    Ok(manifest)
}

fn validate_config(cfg: &PipelineConfig) -> Result<(), PipelineError> {
    if cfg.horizon_days <= 0 {
        return Err(PipelineError::InvalidConfig(
            "horizon_days must be > 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_source_layout() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.horizon_days, 120);
        assert_eq!(
            cfg.input_path,
            PathBuf::from("data/processed/cleaned_transactions.csv")
        );
    }

    #[test]
    fn non_positive_horizon_is_rejected() {
        let cfg = PipelineConfig {
            horizon_days: 0,
            ..PipelineConfig::default()
        };
        let err = run_pipeline(&cfg).expect_err("zero horizon must fail");
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
