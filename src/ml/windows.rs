use ndarray::Array2;

/// Input slice of `seq_len` points paired with the `horizon` points that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceWindow {
    pub input: Vec<f64>,
    pub target: Vec<f64>,
}

/// Number of windows a series of length `len` yields.
pub fn window_count(len: usize, seq_len: usize, horizon: usize) -> usize {
    if seq_len == 0 || horizon == 0 {
        return 0;
    }
    (len + 1).saturating_sub(seq_len + horizon)
}

/// Slide a window one step at a time over `series`, in index order.
/// Empty when the series is shorter than `seq_len + horizon`.
pub fn sample_windows(series: &[f64], seq_len: usize, horizon: usize) -> Vec<SequenceWindow> {
    let count = window_count(series.len(), seq_len, horizon);
    (0..count)
        .map(|i| SequenceWindow {
            input: series[i..i + seq_len].to_vec(),
            target: series[i + seq_len..i + seq_len + horizon].to_vec(),
        })
        .collect()
}

/// Stack windows into `[n, seq_len]` inputs and `[n, horizon]` targets.
pub fn to_matrices(windows: &[SequenceWindow]) -> Option<(Array2<f64>, Array2<f64>)> {
    let first = windows.first()?;
    let (seq_len, horizon) = (first.input.len(), first.target.len());

    let mut x = Array2::zeros((windows.len(), seq_len));
    let mut y = Array2::zeros((windows.len(), horizon));
    for (i, w) in windows.iter().enumerate() {
        for (t, v) in w.input.iter().enumerate() {
            x[[i, t]] = *v;
        }
        for (t, v) in w.target.iter().enumerate() {
            y[[i, t]] = *v;
        }
    }
    Some((x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_count_matches_formula() {
        for len in 0..30 {
            let windows = sample_windows(&vec![0.0; len], 5, 3);
            let expected = if len >= 8 { len - 8 + 1 } else { 0 };
            assert_eq!(windows.len(), expected, "len {}", len);
        }
    }

    #[test]
    fn test_windows_are_contiguous_and_in_order() {
        let series: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let windows = sample_windows(&series, 4, 2);
        assert_eq!(windows.len(), 5);
        assert_eq!(windows[0].input, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(windows[0].target, vec![4.0, 5.0]);
        let last = windows.last().unwrap();
        assert_eq!(last.input, vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(last.target, vec![8.0, 9.0]);
    }

    #[test]
    fn test_insufficient_history_is_empty() {
        assert!(sample_windows(&[1.0, 2.0, 3.0, 4.0, 5.0], 60, 10).is_empty());
        assert!(sample_windows(&[1.0, 2.0], 0, 1).is_empty());
    }

    #[test]
    fn test_to_matrices_shapes() {
        let series: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let windows = sample_windows(&series, 5, 2);
        let (x, y) = to_matrices(&windows).unwrap();
        assert_eq!(x.shape(), &[6, 5]);
        assert_eq!(y.shape(), &[6, 2]);
        assert_eq!(y[[5, 1]], 11.0);
        assert!(to_matrices(&[]).is_none());
    }
}
