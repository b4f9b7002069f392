//! Sorting and fixed-width paging of value counts

use std::collections::HashMap;

use super::models::{CountRow, SortDirection};

/// Sort a value -> count map by count. Ties are always ordered by key,
/// ascending, whatever the direction.
pub fn sort_counts(counts: HashMap<String, i64>, direction: SortDirection) -> Vec<(String, i64)> {
    let mut sorted: Vec<(String, i64)> = counts.into_iter().collect();
    sorted.sort_by(|(key_a, count_a), (key_b, count_b)| {
        let by_count = match direction {
            SortDirection::Increasing => count_a.cmp(count_b),
            SortDirection::Decreasing => count_b.cmp(count_a),
        };
        by_count.then_with(|| key_a.cmp(key_b))
    });
    sorted
}

pub fn page_count(distinct_keys: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    distinct_keys.div_ceil(page_size)
}

/// Pad `rows` with sentinel rows up to `page_size`
pub fn pad_rows(mut rows: Vec<CountRow>, page_size: usize) -> Vec<CountRow> {
    if rows.len() < page_size {
        rows.resize_with(page_size, CountRow::sentinel);
    }
    rows
}

/// Rows of page `page` (zero-based), always exactly `page_size` long
pub fn page_rows(sorted: &[(String, i64)], page: usize, page_size: usize) -> Vec<CountRow> {
    let rows = sorted
        .iter()
        .skip(page.saturating_mul(page_size))
        .take(page_size)
        .map(|(key, count)| CountRow::new(key.clone(), *count))
        .collect();
    pad_rows(rows, page_size)
}
