use tracing::warn;

use crate::forecast::types::{ForecastRow, ForecastTable};

/// Bring any adapter's table into the canonical shape.
///
/// Keeps only the first series when a backend returned several, orders each
/// row's bounds so `p10 <= p90`, clips `mean` into `[p10, p90]`, and sorts by
/// timestamp. Applying it twice gives the same table as applying it once.
pub fn normalize(table: ForecastTable) -> ForecastTable {
    let mut rows = narrow_to_first_series(table.into_rows());

    for row in rows.iter_mut() {
        order_bounds(row);
        clip_mean(row);
    }
    rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

    ForecastTable::new(rows)
}

fn narrow_to_first_series(rows: Vec<ForecastRow>) -> Vec<ForecastRow> {
    let first = match rows.iter().find_map(|r| r.series_id.clone()) {
        Some(id) => id,
        None => return rows,
    };

    let total = rows.len();
    let mut kept: Vec<ForecastRow> = rows
        .into_iter()
        .filter(|r| r.series_id.as_deref() == Some(first.as_str()))
        .collect();

    if kept.len() < total {
        warn!(
            "Multi-series result narrowed to first series '{}' ({} of {} rows kept)",
            first,
            kept.len(),
            total
        );
    }

    for row in kept.iter_mut() {
        row.series_id = None;
    }
    kept
}

fn order_bounds(row: &mut ForecastRow) {
    if row.p10 > row.p90 {
        std::mem::swap(&mut row.p10, &mut row.p90);
    }
}

// NaN bounds leave the mean untouched.
fn clip_mean(row: &mut ForecastRow) {
    if row.p10.is_nan() || row.p90.is_nan() {
        return;
    }
    row.mean = row.mean.clamp(row.p10, row.p90);
}
