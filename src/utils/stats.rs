use std::ops::Range;

use log::*;

/// Quantile of `values` with linear interpolation between the closest ranks
/// (the `(n - 1) * q` definition).
///
/// Returns `None` for empty input or `q` outside `[0, 1]`.
pub fn quantile(
    values: &[f64],
    q: f64,
) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (sorted.len() - 1) as f64 * q;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Splits `len` items into `n_chunks` contiguous ranges whose sizes differ by
/// at most one, with the larger chunks first.
pub fn split_even(
    len: usize,
    n_chunks: usize,
) -> Vec<Range<usize>> {
    if n_chunks == 0 {
        warn!("Requested zero chunks for {} items", len);
        return Vec::new();
    }

    let base = len / n_chunks;
    let extra = len % n_chunks;

    let mut start = 0;
    (0..n_chunks)
        .map(|i| {
            let size = base + usize::from(i < extra);
            let range = start..start + size;
            start += size;
            range
        })
        .collect()
}

/// Index of the smallest value, first one on ties.
pub fn argmin(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (idx, &value)| {
            match best {
                Some((_, best_value)) if best_value <= value => best,
                _ => Some((idx, value)),
            }
        })
        .map(|(idx, _)| idx)
}

/// Evenly spaced values over `[start, stop]`, both ends included.
pub fn linspace(
    start: f64,
    stop: f64,
    n: usize,
) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        },
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    #[test]
    fn quantile_interpolates() {
        let values = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_approx_eq!(quantile(&values, 0.5).unwrap(), 3.0);
        assert_approx_eq!(quantile(&values, 0.6).unwrap(), 3.4);
        assert_approx_eq!(quantile(&values, 0.99).unwrap(), 4.96);
        assert_approx_eq!(quantile(&values, 0.0).unwrap(), 1.0);
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&values, 1.5), None);
    }

    #[test]
    fn split_even_sizes() {
        let chunks = split_even(10, 3);
        assert_eq!(chunks, vec![0..4, 4..7, 7..10]);
        assert!(split_even(10, 0).is_empty());
        assert_eq!(split_even(2, 2), vec![0..1, 1..2]);
    }

    #[test]
    fn argmin_first_on_ties() {
        assert_eq!(argmin(&[3.0, 1.0, 2.0, 1.0]), Some(1));
        assert_eq!(argmin(&[]), None);
    }

    #[test]
    fn linspace_ends() {
        let values = linspace(0.0, 2.0, 5);
        assert_eq!(values, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }
}
