//! Output numeric policy: values leave the engine truncated to two decimals.
//!
//! Truncation moves toward zero, so `1.999` becomes `1.99` and `-1.999`
//! becomes `-1.99`. Rounding is never applied at the output boundary.

/// Truncate toward zero at two decimals.
///
/// The scaled value is snapped to 1e-6 before truncating so that binary noise
/// (`0.29 * 100 = 28.999999999999996`) does not drop a cent.
pub fn truncate2(x: f64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let scaled = (x * 100.0 * 1e6).round() / 1e6;
    let t = scaled.trunc() / 100.0;
    // Avoid "-0.00"
    if t == 0.0 {
        0.0
    } else {
        t
    }
}

/// `truncate2` rendered with exactly two decimals. Non-finite values become
/// an empty cell.
pub fn fmt2(x: f64) -> String {
    if x.is_finite() {
        format!("{:.2}", truncate2(x))
    } else {
        String::new()
    }
}

/// Like [`fmt2`] for optional values.
pub fn fmt2_opt(x: Option<f64>) -> String {
    x.map(fmt2).unwrap_or_default()
}

/// Apply [`truncate2`] to every non-integer number in a JSON document.
/// Integers (indices, timestamps, counts) pass through untouched.
pub fn truncate_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Number(n) if n.is_f64() => {
            if let Some(t) = n
                .as_f64()
                .map(truncate2)
                .and_then(serde_json::Number::from_f64)
            {
                *n = t;
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(truncate_json),
        serde_json::Value::Object(map) => map.values_mut().for_each(truncate_json),
        _ => {}
    }
}
