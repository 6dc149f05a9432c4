//! Vector math: dot product, magnitude, normalization, cosine similarity
//!
//! The dot product has explicit SIMD paths for aarch64 (NEON) and x86_64
//! (AVX2), with a scalar fallback that LLVM auto-vectorizes.
//!
//! Every function here is total. Zero vectors are normalized by substituting
//! an epsilon magnitude, and cosine similarity of mismatched or zero vectors
//! is defined as `0.0`. Squared norms that overflow or underflow f32 are
//! recomputed in f64.
//!
//! ```text
//! cos(θ) = A · B / (||A|| ||B||)     and     cos(θ) = A · B  when ||A|| = ||B|| = 1
//! ```

/// Magnitude substituted for zero vectors during normalization.
pub const DEFAULT_EPSILON: f32 = 1e-10;

// ============================================================================
// aarch64 NEON intrinsics
// ============================================================================

/// NEON dot product: processes 4 floats per iteration
#[cfg(target_arch = "aarch64")]
#[inline(always)]
unsafe fn dot_product_neon(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::aarch64::*;

    let n = a.len();
    let chunks = n / 4;

    let mut acc = vdupq_n_f32(0.0);
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let va = vld1q_f32(a_ptr.add(i * 4));
        let vb = vld1q_f32(b_ptr.add(i * 4));
        acc = vfmaq_f32(acc, va, vb);
    }

    let mut sum = vaddvq_f32(acc);
    for i in chunks * 4..n {
        sum += a[i] * b[i];
    }
    sum
}

// ============================================================================
// x86_64 AVX2 intrinsics (runtime feature detection)
// ============================================================================

/// AVX2+FMA dot product: processes 8 floats per iteration (unaligned load)
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
#[inline]
unsafe fn dot_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    use std::arch::x86_64::*;

    let n = a.len();
    let chunks = n / 8;

    let mut acc = _mm256_setzero_ps();
    let a_ptr = a.as_ptr();
    let b_ptr = b.as_ptr();

    for i in 0..chunks {
        let va = _mm256_loadu_ps(a_ptr.add(i * 8));
        let vb = _mm256_loadu_ps(b_ptr.add(i * 8));
        acc = _mm256_fmadd_ps(va, vb, acc);
    }

    // Horizontal sum of 8 lanes
    let hi = _mm256_extractf128_ps(acc, 1);
    let lo = _mm256_castps256_ps128(acc);
    let sum128 = _mm_add_ps(lo, hi);
    let shuf = _mm_movehdup_ps(sum128);
    let sums = _mm_add_ps(sum128, shuf);
    let shuf2 = _mm_movehl_ps(sums, sums);
    let mut sum = _mm_cvtss_f32(_mm_add_ss(sums, shuf2));

    for i in chunks * 8..n {
        sum += a[i] * b[i];
    }
    sum
}

#[inline(always)]
fn dot_product_scalar(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Compute the dot product of two vectors
///
/// Only the common prefix is used when lengths differ; callers that care
/// about mismatches (such as [`cosine_similarity`]) check lengths first.
#[inline(always)]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    let n = a.len().min(b.len());
    let (a, b) = (&a[..n], &b[..n]);

    #[cfg(target_arch = "aarch64")]
    {
        return unsafe { dot_product_neon(a, b) };
    }

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return unsafe { dot_product_avx2(a, b) };
        }
    }

    #[allow(unreachable_code)]
    dot_product_scalar(a, b)
}

/// Squared norms inside this range are computed in f32 without precision
/// loss; outside it the f32 sum has overflowed or underflowed.
const F32_SQUARED_NORM_RANGE: std::ops::RangeInclusive<f32> = 1e-30..=1e30;

/// Sum of squares accumulated in f64
#[inline]
fn squared_norm_wide(v: &[f32]) -> f64 {
    v.iter().map(|&x| f64::from(x) * f64::from(x)).sum()
}

/// L2 norm in f64, using the SIMD path when the f32 sum is well scaled
#[inline]
fn norm_wide(v: &[f32]) -> f64 {
    let sq = dot_product(v, v);
    if F32_SQUARED_NORM_RANGE.contains(&sq) {
        f64::from(sq).sqrt()
    } else {
        squared_norm_wide(v).sqrt()
    }
}

/// L2 norm: `sqrt(sum(v_i^2))`
///
/// Components whose squares overflow or underflow f32 are summed in f64.
/// The result is `inf` only when the norm itself exceeds `f32::MAX`.
#[inline]
pub fn magnitude(v: &[f32]) -> f32 {
    norm_wide(v) as f32
}

/// Scale `v` to unit length
///
/// A supplied non-zero `magnitude` is used as-is; otherwise the magnitude is
/// computed. A zero magnitude is replaced by `epsilon`, so a zero vector
/// normalizes to a zero vector instead of NaNs. Division happens in f64, so
/// vectors whose norm exceeds `f32::MAX` still normalize to unit length.
pub fn normalize(v: &[f32], magnitude: Option<f32>, epsilon: f32) -> Vec<f32> {
    let mut norm = match magnitude {
        Some(m) if m != 0.0 => f64::from(m),
        _ => norm_wide(v),
    };
    if norm == 0.0 {
        norm = f64::from(epsilon);
    }
    v.iter().map(|&x| (f64::from(x) / norm) as f32).collect()
}

/// Normalize the first `dim` components of `v`
///
/// `dim` is clamped to `v.len()`.
#[inline]
pub fn normalize_prefix(v: &[f32], dim: usize, epsilon: f32) -> Vec<f32> {
    normalize(&v[..dim.min(v.len())], None, epsilon)
}

/// Cosine similarity `a·b / (||a|| ||b||)`
///
/// Returns `0.0` when the lengths differ or either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let sq_a = dot_product(a, a);
    let sq_b = dot_product(b, b);
    if F32_SQUARED_NORM_RANGE.contains(&sq_a) && F32_SQUARED_NORM_RANGE.contains(&sq_b) {
        // |a·b| <= ||a|| ||b|| <= 1e30, so the f32 dot product is finite
        return dot_product(a, b) / (sq_a.sqrt() * sq_b.sqrt());
    }

    let mag_a = squared_norm_wide(a).sqrt();
    let mag_b = squared_norm_wide(b).sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    let dot: f64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum();
    (dot / (mag_a * mag_b)) as f32
}

/// Check if a vector is L2 normalized (unit length)
#[inline]
pub fn is_normalized(v: &[f32], tolerance: f32) -> bool {
    (dot_product(v, v) - 1.0).abs() < tolerance
}
