use crate::error::{FeatherError, Result};

/// Squared Euclidean distance. LOWER is ALWAYS closer.
///
/// The square root is skipped: ranking is identical and both index
/// construction and query scoring go through this one function.
/// Lanes are accumulated in f64 so that long single-precision vectors do not
/// lose enough bits to reorder near-ties.
#[inline(always)]
pub fn distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let mut sum = 0.0f64;

    // Unroll 8: keeps the f64 lanes in registers on AVX2
    let chunks = a.chunks_exact(8);
    let b_chunks = b.chunks_exact(8);
    let remainder_start = a.len() - a.len() % 8;

    for (ac, bc) in chunks.zip(b_chunks) {
        let d0 = ac[0] as f64 - bc[0] as f64;
        let d1 = ac[1] as f64 - bc[1] as f64;
        let d2 = ac[2] as f64 - bc[2] as f64;
        let d3 = ac[3] as f64 - bc[3] as f64;
        let d4 = ac[4] as f64 - bc[4] as f64;
        let d5 = ac[5] as f64 - bc[5] as f64;
        let d6 = ac[6] as f64 - bc[6] as f64;
        let d7 = ac[7] as f64 - bc[7] as f64;

        sum += d0 * d0 + d1 * d1 + d2 * d2 + d3 * d3 + d4 * d4 + d5 * d5 + d6 * d6 + d7 * d7;
    }

    for i in remainder_start..a.len() {
        let diff = a[i] as f64 - b[i] as f64;
        sum += diff * diff;
    }

    sum as f32
}

/// Squared L2 norm, kept in f64 for the flat index bound.
#[inline]
pub fn squared_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| (x as f64) * (x as f64)).sum()
}

pub fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(FeatherError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}
