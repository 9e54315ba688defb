//! Indicator kernels over a chronologically ordered series.
//!
//! Every output at index `t` is computed from inputs at indices `<= t` only, so
//! truncating the input never changes earlier outputs. Values that are not yet
//! defined (warm-up windows) are `None`.

/// Fractional change over `periods` rows: `x[t] / x[t - periods] - 1`.
pub fn pct_change(data: &[f64], periods: usize) -> Vec<Option<f64>> {
    (0..data.len())
        .map(|t| {
            if periods == 0 || t < periods {
                return None;
            }
            let base = data[t - periods];
            if base == 0.0 {
                None
            } else {
                Some(data[t] / base - 1.0)
            }
        })
        .collect()
}

/// Backward-looking Simple Moving Average, aligned to the input.
pub fn rolling_mean(data: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; data.len()];
    }

    let mut result = Vec::with_capacity(data.len());
    let mut sum = 0.0;
    for t in 0..data.len() {
        sum += data[t];
        if t >= window {
            sum -= data[t - window];
        }
        if t + 1 >= window {
            result.push(Some(sum / window as f64));
        } else {
            result.push(None);
        }
    }
    result
}

/// Recursive exponential moving average (no bias adjustment):
/// `y[0] = x[0]`, `y[t] = (1 - alpha) * y[t-1] + alpha * x[t]`.
///
/// Leading `None` inputs stay `None`; the average starts at the first defined
/// value and later gaps carry the previous average forward.
pub fn ewm_mean(data: &[Option<f64>], alpha: f64) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(data.len());
    let mut prev: Option<f64> = None;

    for value in data {
        let next = match (prev, value) {
            (None, Some(x)) => Some(*x),
            (Some(p), Some(x)) => Some((1.0 - alpha) * p + alpha * x),
            (p, None) => p,
        };
        result.push(next);
        prev = next;
    }
    result
}

/// Smoothing factor for a center-of-mass parameterisation.
pub fn alpha_from_com(com: f64) -> f64 {
    1.0 / (1.0 + com)
}

/// Relative Strength Index with Wilder smoothing (EMA with `com = period - 1`).
///
/// Rows where the index is undefined (the first row, or a flat history with no
/// gains and no losses) are reported as the neutral 50.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if closes.is_empty() {
        return vec![];
    }
    let period = period.max(1);

    let mut gains: Vec<Option<f64>> = Vec::with_capacity(closes.len());
    let mut losses: Vec<Option<f64>> = Vec::with_capacity(closes.len());
    gains.push(None);
    losses.push(None);
    for w in closes.windows(2) {
        let change = w[1] - w[0];
        gains.push(Some(change.max(0.0)));
        losses.push(Some((-change).max(0.0)));
    }

    let alpha = alpha_from_com((period - 1) as f64);
    let avg_gain = ewm_mean(&gains, alpha);
    let avg_loss = ewm_mean(&losses, alpha);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(g, l)| match (g, l) {
            (Some(g), Some(l)) if *l > 0.0 => 100.0 - 100.0 / (1.0 + g / l),
            (Some(g), Some(_)) if *g > 0.0 => 100.0,
            _ => 50.0,
        })
        .collect()
}
