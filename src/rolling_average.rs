// src/rolling_average.rs

use crate::error::{DetectorError, DetectorResult};
use std::collections::VecDeque;

/// Arithmetic mean over a fixed sliding window of samples
#[derive(Debug, Clone)]
pub struct RollingAverage {
    history: VecDeque<f64>,
    window_size: usize,
}

impl RollingAverage {
    /// Create a rolling average holding at most `window_size` samples
    ///
    /// # Arguments
    /// * `window_size` - Number of samples kept (must be at least 1)
    pub fn new(window_size: usize) -> DetectorResult<Self> {
        if window_size == 0 {
            return Err(DetectorError::invalid_config(
                "rolling average window size must be at least 1",
            ));
        }

        Ok(Self {
            history: VecDeque::with_capacity(window_size),
            window_size,
        })
    }

    /// Append a sample, evicting the oldest once the window is full
    pub fn push(&mut self, value: f64) {
        self.history.push_back(value);
        if self.history.len() > self.window_size {
            self.history.pop_front();
        }
    }

    /// Mean of the samples currently held, `None` before the first push
    pub fn value(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        Some(self.history.iter().sum::<f64>() / self.history.len() as f64)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window_size
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_window_is_config_error() {
        assert!(matches!(
            RollingAverage::new(0),
            Err(DetectorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_empty_has_no_value() {
        let avg = RollingAverage::new(3).unwrap();
        assert!(avg.value().is_none());
        assert!(avg.is_empty());
    }

    #[test]
    fn test_partial_window_is_mean_of_all_samples() {
        let mut avg = RollingAverage::new(5).unwrap();
        avg.push(2.0);
        avg.push(4.0);
        assert_eq!(avg.value(), Some(3.0));
        assert_eq!(avg.len(), 2);
    }

    #[test]
    fn test_full_window_is_mean_of_last_n_samples() {
        for window in 1..=6 {
            let mut avg = RollingAverage::new(window).unwrap();
            let samples: Vec<f64> = (0..20).map(|i| (i * i) as f64 * 0.5).collect();
            for &s in &samples {
                avg.push(s);
            }

            let tail = &samples[samples.len() - window..];
            let expected = tail.iter().sum::<f64>() / window as f64;
            let actual = avg.value().unwrap();
            assert!((actual - expected).abs() < 1e-9, "window {}", window);
            assert_eq!(avg.len(), window);
        }
    }

    #[test]
    fn test_clear_resets_samples() {
        let mut avg = RollingAverage::new(2).unwrap();
        avg.push(10.0);
        avg.clear();
        assert!(avg.value().is_none());
        assert_eq!(avg.capacity(), 2);
    }
}
