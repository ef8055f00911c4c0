//! Indicator functions over a plain slice of values.
//!
//! Every function returns a vector of the same length as its input, with
//! `f64::NAN` wherever the indicator is not yet defined. Callers strip the
//! warm-up prefix before windowing.

/// Values that are not NaN, in order.
///
/// Feature generators only strip the warm-up prefix; this is for callers
/// that want every defined point of an indicator, e.g. to inspect it.
pub fn drop_undefined(values: &[f64]) -> Vec<f64> {
    values.iter().copied().filter(|v| !v.is_nan()).collect()
}

/// Log return `ln(v[t] / v[t-1])`. The first element is NaN.
pub fn log_return(values: &[f64]) -> Vec<f64> {
    let mut result = Vec::with_capacity(values.len());
    if values.is_empty() {
        return result;
    }
    result.push(f64::NAN);
    result.extend(values.windows(2).map(|w| (w[1] / w[0]).ln()));
    result
}

/// Rolling arithmetic mean over `window` consecutive points.
/// The first `window - 1` elements are NaN.
pub fn sma(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return vec![f64::NAN; values.len()];
    }

    let mut result = vec![f64::NAN; window - 1];
    let mut sum: f64 = values[..window].iter().sum();
    result.push(sum / window as f64);

    for i in window..values.len() {
        sum += values[i] - values[i - window];
        result.push(sum / window as f64);
    }

    result
}

/// Adjusted exponentially weighted mean.
///
/// Each output is the weighted average of every observation seen so far,
/// with weight `(1 - alpha)^age`. NaN inputs count as missing: they age
/// the existing weights but contribute nothing. Outputs stay NaN until
/// `min_periods` observations have been seen.
fn ewm_mean(values: &[f64], alpha: f64, min_periods: usize) -> Vec<f64> {
    let decay = 1.0 - alpha;
    let mut result = Vec::with_capacity(values.len());
    let mut weighted = f64::NAN;
    let mut old_weight = 1.0;
    let mut observations = 0usize;

    for &value in values {
        let is_observation = !value.is_nan();
        if is_observation {
            observations += 1;
        }

        if !weighted.is_nan() {
            old_weight *= decay;
            if is_observation {
                if weighted != value {
                    weighted = (old_weight * weighted + value) / (old_weight + 1.0);
                }
                old_weight += 1.0;
            }
        } else if is_observation {
            weighted = value;
        }

        result.push(if observations >= min_periods {
            weighted
        } else {
            f64::NAN
        });
    }

    result
}

/// Wilder-style RSI built on exponentially weighted gains and losses
/// (`alpha = 1 / window`, at least `window` observations).
/// The first `window` elements are NaN.
pub fn rsi(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 {
        return vec![f64::NAN; values.len()];
    }

    // diff() leaves the first slot undefined
    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i == 0 {
            gains.push(f64::NAN);
            losses.push(f64::NAN);
            continue;
        }
        let change = values[i] - values[i - 1];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let alpha = 1.0 / window as f64;
    let avg_gain = ewm_mean(&gains, alpha, window);
    let avg_loss = ewm_mean(&losses, alpha, window);

    avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(&g, &l)| 100.0 - 100.0 / (1.0 + g / l))
        .collect()
}
