/// Calculate Relative Strength Index for every bar
///
/// Average gain and average loss are simple means of the last `period`
/// close-to-close deltas. The first `period` bars have no value.
///
/// A window without any down-move has no defined RS, so those bars are
/// `None` rather than a saturated 100.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let mut gains = Vec::with_capacity(closes.len());
    let mut losses = Vec::with_capacity(closes.len());
    gains.push(0.0);
    losses.push(0.0);

    for i in 1..closes.len() {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(-change);
        }
    }

    for i in period..closes.len() {
        let window = (i + 1 - period)..=i;
        let avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[window].iter().sum::<f64>() / period as f64;

        if avg_loss == 0.0 {
            continue;
        }

        let rs = avg_gain / avg_loss;
        out[i] = Some(100.0 - (100.0 / (1.0 + rs)));
    }

    out
}
