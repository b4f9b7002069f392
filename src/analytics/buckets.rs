//! Groups per-minute counts into fixed-width time buckets

use super::models::Span;

/// Group time-ascending `(minute, count)` points into `limit` buckets of
/// `span` minutes starting at `start` (rounded down to the span).
///
/// Minutes with no point count as zero. Points outside the requested range
/// are ignored.
pub fn group(points: &[(i64, i64)], start: i64, span: Span, limit: usize) -> Vec<i64> {
    let width = span.minutes();
    let start = span.align(start);

    let Some(&(last_minute, _)) = points.last() else {
        return vec![0; limit];
    };
    if limit == 0 || start > last_minute {
        return vec![0; limit];
    }

    let first = points.partition_point(|&(minute, _)| minute < start);
    let gap = (points[first].0 - start).div_euclid(width);
    if gap >= limit as i64 {
        return vec![0; limit];
    }

    let mut buckets = vec![0; gap as usize];
    let mut boundary = start + gap * width;
    let mut current = 0;

    for &(minute, count) in &points[first..] {
        while minute >= boundary + width {
            buckets.push(current);
            if buckets.len() == limit {
                return buckets;
            }
            current = 0;
            boundary += width;
        }
        current += count;
    }

    buckets.push(current);
    buckets.resize(limit, 0);
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(minutes: i64) -> Span {
        Span::new(minutes).unwrap()
    }

    #[test]
    fn test_hour_buckets() {
        assert_eq!(group(&[(0, 1), (61, 1)], 0, Span::HOUR, 2), vec![1, 1]);
    }

    #[test]
    fn test_minute_buckets_with_gaps() {
        let points = [(10, 2), (12, 5), (13, 1)];
        assert_eq!(group(&points, 10, Span::MINUTE, 5), vec![2, 0, 5, 1, 0]);
    }

    #[test]
    fn test_start_before_data_prepends_zeros() {
        let points = [(30, 4), (35, 1)];
        assert_eq!(group(&points, 0, span(10), 5), vec![0, 0, 0, 5, 0]);
    }

    #[test]
    fn test_gap_at_least_limit_is_all_zeros() {
        let points = [(500, 4)];
        assert_eq!(group(&points, 0, span(10), 3), vec![0, 0, 0]);
    }

    #[test]
    fn test_start_after_data_is_all_zeros() {
        let points = [(0, 1), (5, 1)];
        assert_eq!(group(&points, 60, Span::MINUTE, 4), vec![0; 4]);
        assert_eq!(group(&[], 0, Span::DAY, 3), vec![0; 3]);
    }

    #[test]
    fn test_unaligned_start_rounds_down() {
        let points = [(60, 1), (119, 2), (120, 3)];
        assert_eq!(group(&points, 75, Span::HOUR, 2), vec![3, 3]);
    }

    #[test]
    fn test_points_past_limit_are_dropped() {
        let points = [(0, 1), (1, 1), (2, 1), (3, 1)];
        let buckets = group(&points, 0, Span::MINUTE, 2);
        assert_eq!(buckets, vec![1, 1]);
    }

    #[test]
    fn test_group_is_idempotent_and_conserves_counts() {
        let points: Vec<(i64, i64)> = (0..200).map(|m| (m * 7, m % 3 + 1)).collect();
        let first = group(&points, 140, span(15), 20);
        let second = group(&points, 140, span(15), 20);
        assert_eq!(first, second);

        // 20 buckets of 15 minutes from the aligned start
        let end = 135 + 15 * 20;
        let in_range: i64 = points
            .iter()
            .filter(|&&(m, _)| m >= 135 && m < end)
            .map(|&(_, c)| c)
            .sum();
        assert_eq!(first.iter().sum::<i64>(), in_range);
    }

    #[test]
    fn test_negative_start() {
        let points = [(-30, 2), (10, 1)];
        assert_eq!(group(&points, -45, Span::HOUR, 2), vec![2, 1]);
    }
}
