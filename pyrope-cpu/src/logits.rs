//! Greedy selection over a logits row.
//!
//! Sampling policy beyond argmax is the caller's business; the engine
//! only hands back raw logits.

/// Index of the largest logit. Ties resolve to the lowest index;
/// an empty row yields 0.
#[must_use]
pub fn argmax(logits: &[f32]) -> usize {
    let mut max_idx = 0;
    let mut max_val = f32::NEG_INFINITY;
    for (i, &v) in logits.iter().enumerate() {
        if v > max_val {
            max_val = v;
            max_idx = i;
        }
    }
    max_idx
}
