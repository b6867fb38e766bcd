use chrono::NaiveDateTime;
use churnflow::{
    assemble_feature_rows, assert_schema_compatible, build_customer_aggregates,
    build_feature_schema, derive_ratios, label_churn, split_at_cutoff, window_bounds, ChurnLabel,
    CustomerAggregates, SchemaError, Transaction, FEATURE_SCHEMA_VERSION,
};

const EXPECTED_COLUMNS: [&str; 26] = [
    "CustomerID",
    "Churn",
    "Recency",
    "Frequency",
    "TotalSpent",
    "AvgOrderValue",
    "TotalItems",
    "UniqueProducts",
    "CustomerLifetimeDays",
    "Purchases_Last30Days",
    "Purchases_Last60Days",
    "Purchases_Last90Days",
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

#[test]
fn schema_order_and_fingerprint_are_deterministic() {
    let schema_a = build_feature_schema(120);
    let schema_b = build_feature_schema(120);

    assert_eq!(schema_a.version, FEATURE_SCHEMA_VERSION);
    assert_eq!(schema_a.columns.len(), EXPECTED_COLUMNS.len());
    for (column, expected) in schema_a.columns.iter().zip(EXPECTED_COLUMNS) {
        assert_eq!(column.name, expected);
    }
    assert_eq!(schema_a, schema_b);
    assert_eq!(schema_a.fingerprint.len(), 64);
}

#[test]
fn schema_fingerprint_tracks_horizon() {
    let schema_120 = build_feature_schema(120);
    let schema_90 = build_feature_schema(90);
    assert_ne!(schema_120.fingerprint, schema_90.fingerprint);
}

#[test]
fn schema_compatibility_check_matches_version_and_fingerprint() {
    let schema = build_feature_schema(120);

    assert_schema_compatible(FEATURE_SCHEMA_VERSION, &schema.fingerprint, &schema)
        .expect("compatibility should pass");

    let err = assert_schema_compatible(FEATURE_SCHEMA_VERSION + 1, &schema.fingerprint, &schema)
        .expect_err("version mismatch expected");
    assert!(matches!(err, SchemaError::SchemaVersionMismatch { .. }));

    let err = assert_schema_compatible(FEATURE_SCHEMA_VERSION, "not-real", &schema)
        .expect_err("fingerprint mismatch expected");
    assert!(matches!(err, SchemaError::SchemaFingerprintMismatch { .. }));
}

#[test]
fn aggregates_match_hand_computed_values() {
    let transactions = vec![
        tx(1, "A", "2011-08-01 10:00:00", "P1", 2, 3.0),
        tx(1, "A", "2011-08-01 10:05:00", "P2", 1, 4.0),
        tx(1, "B", "2011-06-01 09:00:00", "P1", 5, 2.0),
        // Anchors the max date; lands in the observation window.
        tx(2, "Z", "2011-12-09 12:00:00", "P9", 1, 1.0),
    ];
    let bounds = window_bounds(&transactions, 120).expect("non-empty input");
    assert_eq!(bounds.training_cutoff, ts("2011-08-11 12:00:00"));

    let split = split_at_cutoff(transactions, &bounds);
    let aggregates = build_customer_aggregates(&split.training, &bounds);

    assert_eq!(aggregates.len(), 1);
    let agg = &aggregates[0];
    assert_eq!(agg.customer_id, 1);
    assert_eq!(agg.frequency, 2);
    assert!((agg.total_spent - 20.0).abs() < 1e-12);
    assert!((agg.avg_order_value - 20.0 / 3.0).abs() < 1e-12);
    assert_eq!(agg.total_items, 8);
    assert_eq!(agg.unique_products, 2);
    // 2011-08-01 10:05 -> 2011-08-11 12:00, whole days.
    assert_eq!(agg.recency_days, 10);
    // 2011-06-01 09:00 -> 2011-08-01 10:05, whole days.
    assert_eq!(agg.lifetime_days, 61);
    // Trailing windows measured backward from the cutoff.
    assert_eq!(agg.purchases_last_30, 1);
    assert_eq!(agg.purchases_last_60, 1);
    assert_eq!(agg.purchases_last_90, 2);
}

#[test]
fn frequency_counts_distinct_invoices_not_line_items() {
    let transactions = vec![
        tx(7, "A", "2011-05-01 08:00:00", "P1", 1, 1.0),
        tx(7, "A", "2011-05-01 08:01:00", "P2", 1, 1.0),
        tx(7, "A", "2011-05-01 08:02:00", "P3", 1, 1.0),
        tx(7, "B", "2011-05-02 08:00:00", "P1", 1, 1.0),
        tx(8, "Z", "2011-12-09 12:00:00", "P9", 1, 1.0),
    ];
    let bounds = window_bounds(&transactions, 120).expect("non-empty input");
    let split = split_at_cutoff(transactions, &bounds);
    let aggregates = build_customer_aggregates(&split.training, &bounds);

    assert_eq!(aggregates[0].frequency, 2);
    assert_eq!(aggregates[0].unique_products, 3);
}

#[test]
fn ratios_are_finite_for_a_degenerate_customer() {
    // Single invoice, no items, zero-day lifetime: every denominator would be
    // zero without smoothing.
    let aggregates = CustomerAggregates {
        customer_id: 42,
        recency_days: 5,
        frequency: 1,
        total_spent: 0.0,
        avg_order_value: 0.0,
        total_items: 0,
        unique_products: 0,
        lifetime_days: 0,
        purchases_last_30: 0,
        purchases_last_60: 0,
        purchases_last_90: 0,
    };
    let ratios = derive_ratios(&aggregates);

    for value in ratio_values(&ratios) {
        assert!(value.is_finite(), "ratio must be finite, got {value}");
    }
    assert!((ratios.recency_to_lifetime_ratio - 5.0).abs() < 1e-12);
    assert_eq!(ratios.avg_items_per_order, 0.0);
}

#[test]
fn ratios_apply_additive_smoothing_to_every_denominator() {
    let aggregates = CustomerAggregates {
        customer_id: 1,
        recency_days: 10,
        frequency: 4,
        total_spent: 100.0,
        avg_order_value: 10.0,
        total_items: 20,
        unique_products: 5,
        lifetime_days: 9,
        purchases_last_30: 2,
        purchases_last_60: 3,
        purchases_last_90: 4,
    };
    let ratios = derive_ratios(&aggregates);

    assert!((ratios.avg_items_per_order - 20.0 / 5.0).abs() < 1e-12);
    assert!((ratios.avg_revenue_per_item - 100.0 / 21.0).abs() < 1e-12);
    assert!((ratios.orders_per_day - 4.0 / 10.0).abs() < 1e-12);
    assert!((ratios.revenue_per_day - 100.0 / 10.0).abs() < 1e-12);
    assert!((ratios.products_per_order - 5.0 / 5.0).abs() < 1e-12);
    assert!((ratios.items_per_product - 20.0 / 6.0).abs() < 1e-12);
    assert!((ratios.product_diversity_ratio - 5.0 / 21.0).abs() < 1e-12);
    assert!((ratios.recency_to_lifetime_ratio - 10.0 / 10.0).abs() < 1e-12);
    assert!((ratios.recent_30_to_60_ratio - 2.0 / 4.0).abs() < 1e-12);
    assert!((ratios.recent_60_to_90_ratio - 3.0 / 5.0).abs() < 1e-12);
    assert!((ratios.spend_per_order - 100.0 / 5.0).abs() < 1e-12);
    assert!((ratios.spend_per_product - 100.0 / 6.0).abs() < 1e-12);
    assert!((ratios.frequency_to_lifetime_ratio - 4.0 / 10.0).abs() < 1e-12);
    assert!((ratios.items_per_day - 20.0 / 10.0).abs() < 1e-12);
}

#[test]
fn assemble_zero_fills_labeled_customers_without_aggregates() {
    let labels = vec![
        ChurnLabel {
            customer_id: 1,
            churned: false,
        },
        ChurnLabel {
            customer_id: 2,
            churned: true,
        },
    ];
    let aggregates = vec![CustomerAggregates {
        customer_id: 1,
        recency_days: 3,
        frequency: 1,
        total_spent: 9.0,
        avg_order_value: 9.0,
        total_items: 3,
        unique_products: 1,
        lifetime_days: 0,
        purchases_last_30: 1,
        purchases_last_60: 1,
        purchases_last_90: 1,
    }];

    let rows = assemble_feature_rows(&labels, aggregates);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].customer_id, 1);
    assert!(!rows[0].churned);
    assert_eq!(rows[1].customer_id, 2);
    assert!(rows[1].churned);
    assert_eq!(rows[1].aggregates.frequency, 0);
    for value in ratio_values(&rows[1].ratios) {
        assert!(value.is_finite());
    }
}

#[test]
fn labeling_and_features_read_disjoint_windows() {
    // The post-cutoff invoice flips the label but must not leak into any
    // training-window aggregate.
    let transactions = vec![
        tx(1, "A", "2011-06-01 10:00:00", "P1", 1, 5.0),
        tx(1, "HUGE", "2011-12-01 10:00:00", "P2", 1_000, 99.0),
        tx(2, "Z", "2011-12-09 12:00:00", "P9", 1, 1.0),
    ];
    let bounds = window_bounds(&transactions, 120).expect("non-empty input");
    let split = split_at_cutoff(transactions, &bounds);

    let labels = label_churn(&split.training, &split.observation);
    assert_eq!(
        labels,
        vec![ChurnLabel {
            customer_id: 1,
            churned: false,
        }]
    );

    let aggregates = build_customer_aggregates(&split.training, &bounds);
    assert_eq!(aggregates.len(), 1);
    assert_eq!(aggregates[0].frequency, 1);
    assert!((aggregates[0].total_spent - 5.0).abs() < 1e-12);
    assert_eq!(aggregates[0].total_items, 1);
}

fn tx(
    customer_id: i64,
    invoice: &str,
    date: &str,
    stock: &str,
    quantity: i64,
    unit_price: f64,
) -> Transaction {
    Transaction {
        customer_id,
        invoice_no: invoice.to_string(),
        invoice_date: ts(date),
        stock_code: stock.to_string(),
        quantity,
        unit_price,
        total_price: quantity as f64 * unit_price,
    }
}

fn ts(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").expect("valid timestamp")
}

fn ratio_values(ratios: &churnflow::DerivedRatios) -> [f64; 14] {
    [
        ratios.avg_items_per_order,
        ratios.avg_revenue_per_item,
        ratios.orders_per_day,
        ratios.revenue_per_day,
        ratios.products_per_order,
        ratios.items_per_product,
        ratios.product_diversity_ratio,
        ratios.recency_to_lifetime_ratio,
        ratios.recent_30_to_60_ratio,
        ratios.recent_60_to_90_ratio,
        ratios.spend_per_order,
        ratios.spend_per_product,
        ratios.frequency_to_lifetime_ratio,
        ratios.items_per_day,
    ]
}
