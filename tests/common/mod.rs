//! Shared fixtures for integration tests

#![allow(dead_code)]

use exovision::features::{FeatureRecord, FEATURE_NAMES};

pub const HEADER: &str =
    "orbital_period,transit_duration,transit_depth,planet_radius,signal_to_noise,koi_score,label";

/// Deterministic labeled KOI table with `n` rows alternating between
/// confirmed planets and false positives.
///
/// The classes are separable on `koi_score`, `signal_to_noise` and
/// `planet_radius`; period, duration and depth carry no signal.
pub fn labeled_csv(n: usize) -> String {
    let mut csv = String::from(HEADER);
    csv.push('\n');
    for i in 0..n {
        csv.push_str(&labeled_row(i));
        csv.push('\n');
    }
    csv
}

fn labeled_row(i: usize) -> String {
    let period = 20.0 + ((i * 37) % 150) as f64;
    let duration = 2.0 + (i % 4) as f64 * 0.75;
    let depth = 0.0008 + (i % 6) as f64 * 0.0003;
    if i % 2 == 0 {
        format!(
            "{:.2},{:.2},{:.4},{:.2},{:.1},{:.3},CONFIRMED",
            period,
            duration,
            depth,
            1.5 + (i % 5) as f64 * 0.3,
            20.0 + (i % 7) as f64 * 2.0,
            0.80 + (i % 10) as f64 * 0.015,
        )
    } else {
        format!(
            "{:.2},{:.2},{:.4},{:.2},{:.1},{:.3},FALSE POSITIVE",
            period,
            duration,
            depth,
            8.0 + (i % 5) as f64,
            5.0 + (i % 7) as f64,
            0.05 + (i % 10) as f64 * 0.03,
        )
    }
}

/// Same table plus `candidates` candidate rows and one row with a blank cell
pub fn labeled_csv_with_noise(n: usize, candidates: usize) -> String {
    let mut csv = labeled_csv(n);
    for _ in 0..candidates {
        csv.push_str("60.00,3.00,0.0012,2.00,14.0,0.600,CANDIDATE\n");
    }
    csv.push_str("60.00,,0.0012,2.00,14.0,0.600,CONFIRMED\n");
    csv
}

/// Feature values in schema order
pub fn confirmed_like() -> [f64; 6] {
    [60.0, 3.5, 0.0012, 2.0, 25.0, 0.9]
}

pub fn false_positive_like() -> [f64; 6] {
    [60.0, 3.5, 0.0012, 10.0, 6.0, 0.1]
}

pub fn record(values: [f64; 6]) -> FeatureRecord {
    FEATURE_NAMES
        .iter()
        .zip(values)
        .map(|(name, v)| (name.to_string(), v))
        .collect()
}

pub fn record_json(values: [f64; 6]) -> serde_json::Value {
    serde_json::to_value(record(values)).unwrap()
}

/// Prediction CSV without a label column
pub fn unlabeled_csv(rows: &[[f64; 6]]) -> String {
    let mut csv = FEATURE_NAMES.join(",");
    csv.push('\n');
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        csv.push_str(&cells.join(","));
        csv.push('\n');
    }
    csv
}
