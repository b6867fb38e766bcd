//! Churn feature-engineering core.
//!
//! Current implemented scope:
//! - cleaned retail transaction ingestion
//! - fixed-horizon training/observation window split
//! - churn target construction from window membership
//! - training-window RFM aggregates and smoothed ratio features
//! - feature table + manifest export

mod export;
mod features;
mod ingest;
mod labeling;
mod observability;
mod pipeline;
mod windows;

pub use export::{write_feature_table, write_manifest, ExportError, FeatureManifest};
pub use features::{
    assemble_feature_rows, assert_schema_compatible, build_customer_aggregates,
    build_feature_schema, derive_ratios, CustomerAggregates, CustomerFeatureRow, DerivedRatios,
    FeatureColumn, FeatureDType, FeatureSchema, SchemaError, FEATURE_SCHEMA_VERSION,
    RECENT_WINDOW_DAYS,
};
pub use ingest::{load_transactions, IngestError, Transaction};
pub use labeling::{churn_rate, label_churn, ChurnLabel};
pub use observability::{
    init_logging, log_app_start, logging_config_from_env, LogFormat, LoggingConfig,
    LoggingInitError,
};
pub use pipeline::{run_pipeline, PipelineConfig, PipelineError, DEFAULT_HORIZON_DAYS};
pub use windows::{split_at_cutoff, window_bounds, WindowBounds, WindowSplit};
