// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// macd_line  = EMA(fast) - EMA(slow)
// signal     = mean of the last `signal_period` MACD line values
// histogram  = macd_line - signal
// =============================================================================

use super::ema::calculate_ema;

#[derive(Debug, Clone, Copy)]
pub struct MacdResult {
    pub macd_line: f64,
    pub signal_line: f64,
    pub histogram: f64,
}

/// Compute the most recent MACD reading for `closes`.
///
/// Returns `None` when there is not enough history to seed both EMA series
/// and the signal-line average.
pub fn calculate_macd(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Option<MacdResult> {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || fast_period >= slow_period {
        return None;
    }

    let ema_fast = calculate_ema(closes, fast_period);
    let ema_slow = calculate_ema(closes, slow_period);
    if ema_fast.is_empty() || ema_slow.is_empty() {
        return None;
    }

    // ema_fast is longer (seeded earlier) than ema_slow; align on the tail.
    let offset = slow_period.saturating_sub(fast_period);
    if ema_fast.len() <= offset {
        return None;
    }
    let aligned_fast = &ema_fast[offset..];
    let len = aligned_fast.len().min(ema_slow.len());
    if len == 0 {
        return None;
    }

    let macd_series: Vec<f64> = aligned_fast[aligned_fast.len() - len..]
        .iter()
        .zip(&ema_slow[ema_slow.len() - len..])
        .map(|(f, s)| f - s)
        .collect();

    if macd_series.len() < signal_period {
        return None;
    }

    let tail = &macd_series[macd_series.len() - signal_period..];
    let signal_line = tail.iter().sum::<f64>() / signal_period as f64;
    let macd_line = *macd_series.last()?;
    let histogram = macd_line - signal_line;

    if macd_line.is_finite() && signal_line.is_finite() {
        Some(MacdResult {
            macd_line,
            signal_line,
            histogram,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_insufficient_data() {
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        assert!(calculate_macd(&closes, 12, 26, 9).is_none());
    }

    #[test]
    fn macd_fast_must_be_less_than_slow() {
        let closes: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        assert!(calculate_macd(&closes, 26, 12, 9).is_none());
    }

    #[test]
    fn macd_ascending_series_is_bullish() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let result = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!(result.macd_line > 0.0);
        assert!(result.macd_line.is_finite());
        assert!(result.signal_line.is_finite());
    }

    #[test]
    fn macd_flat_series_is_zero() {
        let closes = vec![100.0; 100];
        let result = calculate_macd(&closes, 12, 26, 9).unwrap();
        assert!(result.macd_line.abs() < 1e-9);
        assert!(result.histogram.abs() < 1e-9);
    }
}
