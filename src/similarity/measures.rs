// Similarity measures over paired observation vectors and attribute sets.
//
// All measures are pure and total: degenerate input (empty vectors, zero
// norm, no variance) yields 0.0 rather than NaN or an error.

use std::collections::BTreeSet;

/// Fewer paired observations than this and Pearson reports no correlation.
/// Two points always lie on a line, so they carry no signal.
pub const PEARSON_MIN_OBSERVATIONS: usize = 3;

/// Below this many observations the Pearson coefficient is halved.
pub const PEARSON_FULL_CONFIDENCE: usize = 5;

pub fn dot(v1: &[f64], v2: &[f64]) -> f64 {
    v1.iter().zip(v2).map(|(a, b)| a * b).sum()
}

/// Euclidean norm.
pub fn length(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Cosine of the angle between two vectors. 0.0 if either has zero length.
pub fn cosine(v1: &[f64], v2: &[f64]) -> f64 {
    let l1 = length(v1);
    let l2 = length(v2);
    if l1 == 0.0 || l2 == 0.0 {
        return 0.0;
    }
    dot(v1, v2) / (l1 * l2)
}

/// Pearson correlation coefficient of two equal-length vectors.
///
/// Returns 0.0 for fewer than [`PEARSON_MIN_OBSERVATIONS`] pairs or when
/// either side has no variance.
pub fn pearson(v1: &[f64], v2: &[f64]) -> f64 {
    let len = v1.len().min(v2.len());
    if len < PEARSON_MIN_OBSERVATIONS {
        return 0.0;
    }
    let (v1, v2) = (&v1[..len], &v2[..len]);
    let n = len as f64;

    let sum1: f64 = v1.iter().sum();
    let sum2: f64 = v2.iter().sum();
    let sq1: f64 = v1.iter().map(|x| x * x).sum();
    let sq2: f64 = v2.iter().map(|x| x * x).sum();

    let numerator = dot(v1, v2) - (sum1 * sum2 / n);
    let denominator = ((sq1 - sum1 * sum1 / n) * (sq2 - sum2 * sum2 / n)).sqrt();

    // Rounding can push a zero variance slightly negative, which makes sqrt NaN
    if denominator.is_nan() || denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator
}

/// Pearson with the small-sample discount applied: halved when fewer than
/// [`PEARSON_FULL_CONFIDENCE`] observations back it.
pub fn discounted_pearson(v1: &[f64], v2: &[f64]) -> f64 {
    let coefficient = pearson(v1, v2);
    if v1.len().min(v2.len()) < PEARSON_FULL_CONFIDENCE {
        coefficient / 2.0
    } else {
        coefficient
    }
}

/// `|a ∩ b| / |a ∪ b|`, or 0.0 when both sets are empty.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Jaccard over single-language sets.
///
/// Every channel in the guide has a language, so `None` only appears in
/// imported datasets that leave it out. It is treated as an empty set: two
/// channels without a language score 0.0 rather than 1.0, and a channel
/// without one never matches a channel that has one.
pub fn language_overlap(a: Option<&str>, b: Option<&str>) -> f64 {
    let a: BTreeSet<&str> = a.into_iter().collect();
    let b: BTreeSet<&str> = b.into_iter().collect();
    jaccard(&a, &b)
}
