//! Series regularization
//!
//! Converts the samples returned by ATSD into an evenly spaced value array
//! suitable for fixed-column rendering.
//!
//! # Cases
//!
//! ```text
//! no samples          → one empty bucket spanning the requested window
//! one sample          → one bucket spanning the requested window
//! server-side step    → (first, last + step, step), values as returned
//! raw samples         → median-delta step, aligned grid, nearest fit
//! ```
//!
//! The returned grid always satisfies `(end - start) / step == values.len()`.

use super::{Sample, SeriesData, TimeInfo, TimeRange};

/// Regularize `samples` fetched for `window`.
///
/// `explicit_step` is the aggregation step (ms) ATSD was asked to apply, if
/// any. Out-of-order samples are sorted by timestamp first.
pub fn regularize(samples: &[Sample], explicit_step: Option<i64>, window: TimeRange) -> SeriesData {
    let sorted: Vec<Sample>;
    let samples = if samples.windows(2).all(|w| w[0].t <= w[1].t) {
        samples
    } else {
        let mut copy = samples.to_vec();
        copy.sort_by_key(|s| s.t);
        sorted = copy;
        sorted.as_slice()
    };

    match samples {
        [] => single_bucket(window, None),
        [only] => single_bucket(window, only.v),
        [first, .., last] => match explicit_step.filter(|step| *step > 0) {
            Some(step) if is_contiguous(first.t, last.t, step, samples.len()) => SeriesData {
                time_info: TimeInfo {
                    start: first.t,
                    end: last.t + step,
                    step,
                },
                values: samples.iter().map(|s| s.v).collect(),
            },
            // Server cadence with holes (interpolation NONE): fit onto its own step
            Some(step) => fit_to_grid(samples, step),
            None => match median_step(samples) {
                Some(step) => fit_to_grid(samples, step),
                None => single_bucket(window, last.v),
            },
        },
    }
}

fn single_bucket(window: TimeRange, value: Option<f64>) -> SeriesData {
    SeriesData {
        time_info: TimeInfo {
            start: window.start,
            end: window.end,
            step: window.duration_millis(),
        },
        values: vec![value],
    }
}

fn is_contiguous(first: i64, last: i64, step: i64, len: usize) -> bool {
    (last - first) % step == 0 && ((last - first) / step) as usize + 1 == len
}

/// Median of consecutive deltas, upper middle element for even counts.
///
/// Falls back to the smallest positive delta when the median is not
/// positive (duplicate timestamps). `None` when every sample shares one
/// timestamp.
fn median_step(samples: &[Sample]) -> Option<i64> {
    let mut deltas: Vec<i64> = samples.windows(2).map(|w| w[1].t - w[0].t).collect();
    deltas.sort_unstable();

    let median = deltas[deltas.len() / 2];
    if median > 0 {
        return Some(median);
    }
    deltas.into_iter().find(|d| *d > 0)
}

/// Walk the aligned grid left to right, consuming a sample into the current
/// bucket only when it lies strictly within one step of the bucket time.
fn fit_to_grid(samples: &[Sample], step: i64) -> SeriesData {
    let first = samples[0].t;
    let last = samples[samples.len() - 1].t;

    let start = first.div_euclid(step) * step;
    let end = (last.div_euclid(step) + 1) * step;
    let time_info = TimeInfo { start, end, step };
    let buckets = time_info.buckets();

    let mut values = Vec::with_capacity(buckets);
    let mut next = 0;

    for i in 0..buckets {
        let t = time_info.bucket_time(i);

        // Samples a full step behind can no longer fill any bucket
        while next < samples.len() && samples[next].t <= t - step {
            next += 1;
        }

        match samples.get(next) {
            Some(sample) if (sample.t - t).abs() < step => {
                values.push(sample.v);
                next += 1;
            }
            _ => values.push(None),
        }
    }

    SeriesData { time_info, values }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> TimeRange {
        TimeRange::new(1_000_000, 1_600_000).unwrap()
    }

    fn samples(points: &[(i64, f64)]) -> Vec<Sample> {
        points.iter().map(|(t, v)| Sample::new(*t, *v)).collect()
    }

    fn assert_grid_invariant(data: &SeriesData) {
        let ti = data.time_info;
        assert!(ti.step > 0);
        assert_eq!((ti.end - ti.start) % ti.step, 0);
        assert_eq!(((ti.end - ti.start) / ti.step) as usize, data.values.len());
    }

    #[test]
    fn test_empty_spans_requested_window() {
        let data = regularize(&[], None, window());
        assert_eq!(
            data.time_info,
            TimeInfo {
                start: 1_000_000,
                end: 1_600_000,
                step: 600_000
            }
        );
        assert_eq!(data.values, vec![None]);
        assert_grid_invariant(&data);
    }

    #[test]
    fn test_single_sample_spans_requested_window() {
        let data = regularize(&samples(&[(1_200_000, 4.5)]), Some(60_000), window());
        assert_eq!(data.time_info.start, 1_000_000);
        assert_eq!(data.time_info.end, 1_600_000);
        assert_eq!(data.values, vec![Some(4.5)]);
    }

    #[test]
    fn test_explicit_step_passes_values_through() {
        let input = samples(&[(60_000, 1.0), (120_000, 2.0), (180_000, 3.0)]);
        let data = regularize(&input, Some(60_000), window());

        assert_eq!(
            data.time_info,
            TimeInfo {
                start: 60_000,
                end: 240_000,
                step: 60_000
            }
        );
        assert_eq!(data.values, vec![Some(1.0), Some(2.0), Some(3.0)]);
        assert_grid_invariant(&data);
    }

    #[test]
    fn test_explicit_step_with_holes_is_gridded() {
        let input = samples(&[(60_000, 1.0), (180_000, 3.0)]);
        let data = regularize(&input, Some(60_000), window());

        assert_eq!(data.values, vec![Some(1.0), None, Some(3.0)]);
        assert_grid_invariant(&data);
    }

    #[test]
    fn test_aligned_gap_free_is_unchanged() {
        let input = samples(&[
            (10_000, 1.0),
            (15_000, 2.0),
            (20_000, 3.0),
            (25_000, 4.0),
            (30_000, 5.0),
        ]);
        let data = regularize(&input, None, window());

        assert_eq!(data.time_info.step, 5_000);
        assert_eq!(data.time_info.start, 10_000);
        assert_eq!(data.time_info.end, 35_000);
        assert_eq!(
            data.values,
            vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0), Some(5.0)]
        );
    }

    #[test]
    fn test_gap_emits_no_data() {
        let input = samples(&[(0, 1.0), (10_000, 2.0), (30_000, 4.0), (40_000, 5.0)]);
        let data = regularize(&input, None, window());

        assert_eq!(data.time_info.step, 10_000);
        assert_eq!(
            data.values,
            vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)]
        );
        assert_grid_invariant(&data);
    }

    #[test]
    fn test_jitter_is_tolerated() {
        let input = samples(&[
            (60_400, 1.0),
            (119_800, 2.0),
            (180_900, 3.0),
            (240_100, 4.0),
        ]);
        let data = regularize(&input, None, window());

        assert_eq!(data.values.iter().flatten().count(), 4);
        assert_eq!(data.values.first().copied().flatten(), Some(1.0));
        assert_grid_invariant(&data);
    }

    #[test]
    fn test_start_aligned_to_step() {
        let input = samples(&[(12_345, 1.0), (22_345, 2.0), (32_345, 3.0)]);
        let data = regularize(&input, None, window());

        assert_eq!(data.time_info.step, 10_000);
        assert_eq!(data.time_info.start, 10_000);
        assert_eq!(data.time_info.end, 40_000);
        assert_eq!(data.values, vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_duplicate_timestamps() {
        let input = samples(&[(5_000, 1.0), (5_000, 2.0), (5_000, 3.0)]);
        let data = regularize(&input, None, window());
        assert_eq!(data.values, vec![Some(3.0)]);
        assert_eq!(data.time_info.start, window().start);
    }

    #[test]
    fn test_grid_invariant_on_irregular_inputs() {
        let cases: Vec<Vec<(i64, f64)>> = vec![
            vec![(0, 1.0), (1, 2.0)],
            vec![(0, 1.0), (7, 2.0), (100, 3.0)],
            vec![(1_000, 1.0), (1_003, 2.0), (1_010, 3.0), (1_020, 4.0), (5_000, 5.0)],
            vec![(-5_000, 1.0), (0, 2.0), (5_000, 3.0)],
            vec![(0, 1.0), (60_000, 2.0), (61_000, 3.0), (62_000, 4.0), (3_600_000, 5.0)],
        ];

        for case in cases {
            let data = regularize(&samples(&case), None, window());
            assert_grid_invariant(&data);
        }
    }

    #[test]
    fn test_out_of_order_samples_are_sorted() {
        let data = regularize(
            &samples(&[(100_000, 1.0), (110_000, 2.0), (120_000, 3.0), (0, 0.0)]),
            None,
            window(),
        );
        assert_grid_invariant(&data);
        assert_eq!(data.time_info.start, 0);
        assert_eq!(data.values.first(), Some(&Some(0.0)));
        assert_eq!(data.values.last(), Some(&Some(3.0)));
    }
}
