//! Reductions from token-level hidden states to one vector per input.

use crate::error::{Result, ScoringError};

/// Attention-mask-weighted mean over the sequence axis.
///
/// `hidden` is row-major `[batch, seq_len, dim]` and `mask` `[batch, seq_len]`.
/// Masked positions contribute nothing; a row with no unmasked positions
/// pools to zeros.
pub fn mean_pool(
    hidden: &[f32],
    mask: &[i64],
    batch: usize,
    seq_len: usize,
    dim: usize,
) -> Result<Vec<Vec<f32>>> {
    if hidden.len() != batch * seq_len * dim {
        return Err(ScoringError::DimensionMismatch {
            expected: batch * seq_len * dim,
            got: hidden.len(),
        });
    }
    if mask.len() != batch * seq_len {
        return Err(ScoringError::DimensionMismatch {
            expected: batch * seq_len,
            got: mask.len(),
        });
    }

    let mut pooled = Vec::with_capacity(batch);
    for b in 0..batch {
        let mut sum = vec![0.0f32; dim];
        let mut count = 0usize;
        for t in 0..seq_len {
            if mask[b * seq_len + t] == 0 {
                continue;
            }
            count += 1;
            let start = (b * seq_len + t) * dim;
            for (acc, v) in sum.iter_mut().zip(&hidden[start..start + dim]) {
                *acc += v;
            }
        }
        if count > 0 {
            let n = count as f32;
            sum.iter_mut().for_each(|v| *v /= n);
        }
        pooled.push(sum);
    }
    Ok(pooled)
}

/// Scales `v` to unit Euclidean length. Zero vectors are left unchanged.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_mean_pool_ignores_padding() {
        // batch 2, seq 3, dim 2; second row has one padded position
        let hidden = [
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, //
            2.0, 2.0, 4.0, 4.0, 100.0, -100.0,
        ];
        let mask = [1, 1, 1, 1, 1, 0];
        let pooled = mean_pool(&hidden, &mask, 2, 3, 2).unwrap();
        assert_eq!(pooled[0], vec![3.0, 4.0]);
        assert_eq!(pooled[1], vec![3.0, 3.0]);
    }

    #[test]
    fn test_fully_masked_row_is_zero() {
        let pooled = mean_pool(&[1.0, 2.0], &[0], 1, 1, 2).unwrap();
        assert_eq!(pooled[0], vec![0.0, 0.0]);
    }

    #[test]
    fn test_shape_errors() {
        assert!(matches!(
            mean_pool(&[1.0; 5], &[1, 1], 1, 2, 3),
            Err(ScoringError::DimensionMismatch { expected: 6, got: 5 })
        ));
        assert!(mean_pool(&[1.0; 6], &[1], 1, 2, 3).is_err());
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = [3.0f32, 4.0];
        l2_normalize(&mut v);
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(v[1], 0.8, epsilon = 1e-6);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-5);

        let mut zero = [0.0f32; 3];
        l2_normalize(&mut zero);
        assert_eq!(zero, [0.0; 3]);
    }
}
