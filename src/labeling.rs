//! Churn target construction from window membership.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ingest::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChurnLabel {
    pub customer_id: i64,
    pub churned: bool,
}

/// Labels every distinct training-window customer: churned iff the customer
/// never appears in the observation window. Customers seen only in the
/// observation window are excluded; they have no feature history to predict
/// from. Output is sorted by customer id.
pub fn label_churn(training: &[Transaction], observation: &[Transaction]) -> Vec<ChurnLabel> {
    let training_customers: BTreeSet<i64> = training.iter().map(|t| t.customer_id).collect();
    let observation_customers: HashSet<i64> = observation.iter().map(|t| t.customer_id).collect();

    let labels: Vec<ChurnLabel> = training_customers
        .into_iter()
        .map(|customer_id| ChurnLabel {
            customer_id,
            churned: !observation_customers.contains(&customer_id),
        })
        .collect();

    info!(
        component = "labeling",
        event = "labeling.finish",
        customers = labels.len(),
        churned = labels.iter().filter(|label| label.churned).count(),
        churn_rate = churn_rate(&labels)
    );

    labels
}

/// Fraction of labeled customers marked churned; `0.0` for the empty set so a
/// degenerate window yields a well-defined manifest value.
pub fn churn_rate(labels: &[ChurnLabel]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    labels.iter().filter(|label| label.churned).count() as f64 / labels.len() as f64
}
