// =============================================================================
// Relative Strength Index (RSI) — simple-average form
// =============================================================================
//
// Unlike Wilder's exponentially smoothed RSI, this form re-derives the average
// gain and average loss from scratch over the trailing `period` deltas on
// every call — no running state is carried between calls. This matches the
// per-frame recomputation the technical-analysis agent performs against its
// rolling buffer.
//
// Step 1 — Compute price deltas from consecutive closes.
// Step 2 — avg_gain = mean(gains over the last `period` deltas)
//          avg_loss = mean(losses over the last `period` deltas)
// Step 3 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// Thresholds:  RSI > 70 => OVERBOUGHT,  RSI < 30 => OVERSOLD.
// =============================================================================

/// Compute the most recent RSI value over the trailing `period` deltas of
/// `closes`.
///
/// # Edge cases
/// - `period == 0` or fewer than `period + 1` closes => neutral 50.0.
/// - `avg_loss == 0.0` (no down moves in the window) => 100.0.
pub fn calculate_rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return 50.0;
    }

    let window = &closes[closes.len() - period - 1..];
    let deltas: Vec<f64> = window.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas.iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let avg_gain = sum_gain / period_f;
    let avg_loss = sum_loss / period_f;

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - 100.0 / (1.0 + rs);
    if rsi.is_finite() {
        rsi
    } else {
        50.0
    }
}

/// Convenience wrapper returning the value together with a human-readable
/// label.
pub fn current_rsi(closes: &[f64], period: usize) -> (f64, &'static str) {
    let value = calculate_rsi(closes, period);
    let label = if value >= 70.0 {
        "OVERBOUGHT"
    } else if value <= 30.0 {
        "OVERSOLD"
    } else {
        "NEUTRAL"
    };
    (value, label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_input() {
        assert_eq!(calculate_rsi(&[], 14), 50.0);
    }

    #[test]
    fn rsi_period_zero() {
        assert_eq!(calculate_rsi(&[1.0, 2.0, 3.0], 0), 50.0);
    }

    #[test]
    fn rsi_insufficient_data() {
        let closes: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert_eq!(calculate_rsi(&closes, 14), 50.0);
    }

    #[test]
    fn rsi_all_gains() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        assert!((calculate_rsi(&closes, 14) - 100.0).abs() < 1e-10);
    }

    #[test]
    fn rsi_all_losses() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        assert!(calculate_rsi(&closes, 14).abs() < 1e-10);
    }

    #[test]
    fn rsi_flat_market() {
        let closes = vec![100.0; 30];
        assert!((calculate_rsi(&closes, 14) - 50.0).abs() < 1e-10);
    }

    #[test]
    fn rsi_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let v = calculate_rsi(&closes, 14);
        assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
    }

    #[test]
    fn current_rsi_overbought() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let (val, label) = current_rsi(&closes, 14);
        assert!((val - 100.0).abs() < 1e-10);
        assert_eq!(label, "OVERBOUGHT");
    }

    #[test]
    fn current_rsi_oversold() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let (val, label) = current_rsi(&closes, 14);
        assert!(val.abs() < 1e-10);
        assert_eq!(label, "OVERSOLD");
    }

    #[test]
    fn current_rsi_neutral() {
        let closes = vec![100.0; 30];
        let (val, label) = current_rsi(&closes, 14);
        assert!((val - 50.0).abs() < 1e-10);
        assert_eq!(label, "NEUTRAL");
    }
}
