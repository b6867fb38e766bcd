//! Training-window RFM aggregates and smoothed ratio features.
//!
//! Every aggregate reads training-window rows only; the observation window
//! exists solely for the churn label. All ratio denominators carry a fixed
//! `+1` smoothing term, so every derived value is finite for every customer,
//! including single-invoice customers with a zero-day lifetime. The smoothing
//! biases ratios downward for all customers; that is the documented contract,
//! not a defect.

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::ingest::Transaction;
use crate::labeling::ChurnLabel;
use crate::windows::WindowBounds;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

/// Trailing activity sub-windows, measured backward from the cutoff.
pub const RECENT_WINDOW_DAYS: [i64; 3] = [30, 60, 90];

const RATIO_COLUMNS: [&str; 14] = [
    "AvgItemsPerOrder",
    "AvgRevenuePerItem",
    "OrdersPerDay",
    "RevenuePerDay",
    "ProductsPerOrder",
    "ItemsPerProduct",
    "ProductDiversityRatio",
    "RecencyToLifetimeRatio",
    "Recent30to60Ratio",
    "Recent60to90Ratio",
    "SpendPerOrder",
    "SpendPerProduct",
    "FrequencyToLifetimeRatio",
    "ItemsPerDay",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    I64,
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
}

/// Ordered column contract the downstream scaler, classifiers, and serving
/// layer align on. Column order and names are load-bearing; consumers index
/// by position and will silently misalign if either changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

/// Per-customer summary statistics over that customer's training-window rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAggregates {
    pub customer_id: i64,
    /// Days from the last training-window purchase to the cutoff.
    pub recency_days: i64,
    /// Distinct invoice count.
    pub frequency: u64,
    pub total_spent: f64,
    /// Mean TotalPrice per line item, not per invoice. Preserved source
    /// semantics; renaming or reaveraging requires downstream sign-off.
    pub avg_order_value: f64,
    pub total_items: i64,
    pub unique_products: u64,
    /// Days between first and last training-window purchase.
    pub lifetime_days: i64,
    pub purchases_last_30: u64,
    pub purchases_last_60: u64,
    pub purchases_last_90: u64,
}

impl CustomerAggregates {
    fn zeroed(customer_id: i64) -> Self {
        Self {
            customer_id,
            recency_days: 0,
            frequency: 0,
            total_spent: 0.0,
            avg_order_value: 0.0,
            total_items: 0,
            unique_products: 0,
            lifetime_days: 0,
            purchases_last_30: 0,
            purchases_last_60: 0,
            purchases_last_90: 0,
        }
    }
}

/// The 14 smoothed ratio features, in output column order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedRatios {
    pub avg_items_per_order: f64,
    pub avg_revenue_per_item: f64,
    pub orders_per_day: f64,
    pub revenue_per_day: f64,
    pub products_per_order: f64,
    pub items_per_product: f64,
    pub product_diversity_ratio: f64,
    pub recency_to_lifetime_ratio: f64,
    pub recent_30_to_60_ratio: f64,
    pub recent_60_to_90_ratio: f64,
    pub spend_per_order: f64,
    pub spend_per_product: f64,
    pub frequency_to_lifetime_ratio: f64,
    pub items_per_day: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerFeatureRow {
    pub customer_id: i64,
    pub churned: bool,
    pub aggregates: CustomerAggregates,
    pub ratios: DerivedRatios,
}

pub fn build_feature_schema(horizon_days: i64) -> FeatureSchema {
    let mut columns = vec![
        column("CustomerID", FeatureDType::I64),
        column("Churn", FeatureDType::I64),
        column("Recency", FeatureDType::I64),
        column("Frequency", FeatureDType::I64),
        column("TotalSpent", FeatureDType::F64),
        column("AvgOrderValue", FeatureDType::F64),
        column("TotalItems", FeatureDType::I64),
        column("UniqueProducts", FeatureDType::I64),
        column("CustomerLifetimeDays", FeatureDType::I64),
    ];
    for days in RECENT_WINDOW_DAYS {
        columns.push(column(
            &format!("Purchases_Last{days}Days"),
            FeatureDType::I64,
        ));
    }
    for name in RATIO_COLUMNS {
        columns.push(column(name, FeatureDType::F64));
    }

    let fingerprint = schema_fingerprint(horizon_days, &columns);

    info!(
        component = "features",
        event = "features.schema.built",
        version = FEATURE_SCHEMA_VERSION,
        horizon_days = horizon_days,
        column_count = columns.len(),
        fingerprint = fingerprint
    );

    FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), SchemaError> {
    if expected_version != actual.version {
        return Err(SchemaError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(SchemaError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

/// One grouped pass over the training window. Customers absent from a
/// trailing sub-window get `0` for that count, never a missing value.
pub fn build_customer_aggregates(
    training: &[Transaction],
    bounds: &WindowBounds,
) -> Vec<CustomerAggregates> {
    let mut groups: BTreeMap<i64, Accumulator<'_>> = BTreeMap::new();
    let recent_cutoffs =
        RECENT_WINDOW_DAYS.map(|days| bounds.training_cutoff - Duration::days(days));

    for transaction in training {
        let group = groups
            .entry(transaction.customer_id)
            .or_insert_with(|| Accumulator::new(transaction.invoice_date));
        group.push(transaction, &recent_cutoffs);
    }

    let aggregates: Vec<CustomerAggregates> = groups
        .into_iter()
        .map(|(customer_id, group)| group.finish(customer_id, bounds.training_cutoff))
        .collect();

    info!(
        component = "features",
        event = "features.aggregate.finish",
        customers = aggregates.len(),
        training_rows = training.len()
    );

    aggregates
}

pub fn derive_ratios(aggregates: &CustomerAggregates) -> DerivedRatios {
    let frequency = aggregates.frequency as f64;
    let total_items = aggregates.total_items as f64;
    let unique_products = aggregates.unique_products as f64;
    let lifetime = aggregates.lifetime_days as f64;
    let recency = aggregates.recency_days as f64;
    let last_30 = aggregates.purchases_last_30 as f64;
    let last_60 = aggregates.purchases_last_60 as f64;
    let last_90 = aggregates.purchases_last_90 as f64;

    DerivedRatios {
        avg_items_per_order: smoothed(total_items, frequency),
        avg_revenue_per_item: smoothed(aggregates.total_spent, total_items),
        orders_per_day: smoothed(frequency, lifetime),
        revenue_per_day: smoothed(aggregates.total_spent, lifetime),
        products_per_order: smoothed(unique_products, frequency),
        items_per_product: smoothed(total_items, unique_products),
        product_diversity_ratio: smoothed(unique_products, total_items),
        recency_to_lifetime_ratio: smoothed(recency, lifetime),
        recent_30_to_60_ratio: smoothed(last_30, last_60),
        recent_60_to_90_ratio: smoothed(last_60, last_90),
        spend_per_order: smoothed(aggregates.total_spent, frequency),
        spend_per_product: smoothed(aggregates.total_spent, unique_products),
        frequency_to_lifetime_ratio: smoothed(frequency, lifetime),
        items_per_day: smoothed(total_items, lifetime),
    }
}

/// Joins labels to aggregates by customer id. Every labeled customer has
/// training rows by construction; a missing group still zero-fills rather
/// than dropping the row, matching the outer-merge semantics of the table.
pub fn assemble_feature_rows(
    labels: &[ChurnLabel],
    aggregates: Vec<CustomerAggregates>,
) -> Vec<CustomerFeatureRow> {
    let mut by_customer: BTreeMap<i64, CustomerAggregates> = aggregates
        .into_iter()
        .map(|aggregate| (aggregate.customer_id, aggregate))
        .collect();

    labels
        .iter()
        .map(|label| {
            let aggregates = by_customer
                .remove(&label.customer_id)
                .unwrap_or_else(|| CustomerAggregates::zeroed(label.customer_id));
            let ratios = derive_ratios(&aggregates);
            CustomerFeatureRow {
                customer_id: label.customer_id,
                churned: label.churned,
                aggregates,
                ratios,
            }
        })
        .collect()
}

struct Accumulator<'a> {
    invoices: HashSet<&'a str>,
    products: HashSet<&'a str>,
    line_items: u64,
    total_spent: f64,
    total_items: i64,
    first_date: NaiveDateTime,
    last_date: NaiveDateTime,
    recent_invoices: [HashSet<&'a str>; 3],
}

impl<'a> Accumulator<'a> {
    fn new(first_seen: NaiveDateTime) -> Self {
        Self {
            invoices: HashSet::new(),
            products: HashSet::new(),
            line_items: 0,
            total_spent: 0.0,
            total_items: 0,
            first_date: first_seen,
            last_date: first_seen,
            recent_invoices: [HashSet::new(), HashSet::new(), HashSet::new()],
        }
    }

    fn push(&mut self, transaction: &'a Transaction, recent_cutoffs: &[NaiveDateTime; 3]) {
        self.invoices.insert(&transaction.invoice_no);
        self.products.insert(&transaction.stock_code);
        self.line_items += 1;
        self.total_spent += transaction.total_price;
        self.total_items += transaction.quantity;
        self.first_date = self.first_date.min(transaction.invoice_date);
        self.last_date = self.last_date.max(transaction.invoice_date);

        for (window, window_cutoff) in self.recent_invoices.iter_mut().zip(recent_cutoffs) {
            if transaction.invoice_date > *window_cutoff {
                window.insert(&transaction.invoice_no);
            }
        }
    }

    fn finish(self, customer_id: i64, training_cutoff: NaiveDateTime) -> CustomerAggregates {
        CustomerAggregates {
            customer_id,
            recency_days: (training_cutoff - self.last_date).num_days(),
            frequency: self.invoices.len() as u64,
            total_spent: self.total_spent,
            avg_order_value: self.total_spent / self.line_items as f64,
            total_items: self.total_items,
            unique_products: self.products.len() as u64,
            lifetime_days: (self.last_date - self.first_date).num_days(),
            purchases_last_30: self.recent_invoices[0].len() as u64,
            purchases_last_60: self.recent_invoices[1].len() as u64,
            purchases_last_90: self.recent_invoices[2].len() as u64,
        }
    }
}

fn smoothed(numerator: f64, denominator: f64) -> f64 {
    numerator / (denominator + 1.0)
}

fn column(name: &str, dtype: FeatureDType) -> FeatureColumn {
    FeatureColumn {
        name: name.to_string(),
        dtype,
    }
}

fn schema_fingerprint(horizon_days: i64, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{FEATURE_SCHEMA_VERSION};"));
    hasher.update(format!("horizon_days:{horizon_days};"));
    hasher.update("recent_windows:");
    for days in RECENT_WINDOW_DAYS {
        hasher.update(format!("{days},"));
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        match column.dtype {
            FeatureDType::I64 => hasher.update(":i64;"),
            FeatureDType::F64 => hasher.update(":f64;"),
        }
    }
    hex::encode(hasher.finalize())
}
