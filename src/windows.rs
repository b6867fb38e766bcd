//! Training/observation window split around a single fixed-horizon cutoff.
//!
//! The cutoff is computed once from the full dataset and reused for both the
//! churn label and every feature window. Labels read only the observation
//! side, features read only the training side; a mismatched cutoff would
//! silently corrupt the label's temporal validity.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ingest::Transaction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowBounds {
    pub training_cutoff: NaiveDateTime,
    pub observation_end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowSplit {
    pub training: Vec<Transaction>,
    pub observation: Vec<Transaction>,
}

/// Computes `cutoff = max(InvoiceDate) - horizon`. `None` when there are no
/// transactions to anchor the cutoff on.
pub fn window_bounds(transactions: &[Transaction], horizon_days: i64) -> Option<WindowBounds> {
    let observation_end = transactions.iter().map(|t| t.invoice_date).max()?;
    Some(WindowBounds {
        training_cutoff: observation_end - Duration::days(horizon_days),
        observation_end,
    })
}

/// Partitions transactions into `training = {t : InvoiceDate <= cutoff}` and
/// `observation = {t : InvoiceDate > cutoff}`. The partitions are disjoint
/// and exhaustive; the cutoff boundary is inclusive on the training side.
pub fn split_at_cutoff(transactions: Vec<Transaction>, bounds: &WindowBounds) -> WindowSplit {
    let mut training = Vec::new();
    let mut observation = Vec::new();

    for transaction in transactions {
        if transaction.invoice_date <= bounds.training_cutoff {
            training.push(transaction);
        } else {
            observation.push(transaction);
        }
    }

    info!(
        component = "windows",
        event = "windows.split.finish",
        training_cutoff = %bounds.training_cutoff,
        observation_end = %bounds.observation_end,
        training_rows = training.len(),
        observation_rows = observation.len()
    );

    WindowSplit {
        training,
        observation,
    }
}
