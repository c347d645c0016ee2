//! Comparing embeddings, and classifying them against labelled examples.

use crate::chain::LabelScore;
use crate::error::{Result, ScoringError};
use crate::rank::SortDescending;
use crate::ScoreStage;

fn check_dims(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(ScoringError::DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(())
}

/// Cosine of the angle between `a` and `b`, in [-1, 1]. Zero when either
/// vector has zero length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    check_dims(a, b)?;
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = (na * nb).sqrt();
    if denom <= f32::EPSILON {
        return Ok(0.0);
    }
    Ok((dot / denom).clamp(-1.0, 1.0))
}

/// Element-wise mean of equally sized vectors.
pub fn average_vector(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let first = vectors.first().ok_or(ScoringError::Empty("vector set"))?;
    let mut sum = vec![0.0f32; first.len()];
    for v in vectors {
        check_dims(first, v)?;
        for (acc, x) in sum.iter_mut().zip(v) {
            *acc += x;
        }
    }
    let n = vectors.len() as f32;
    sum.iter_mut().for_each(|x| *x /= n);
    Ok(sum)
}

/// Few-shot classifier: each class is the mean embedding of its examples,
/// and a query is scored by cosine similarity to every class centroid.
#[derive(Debug, Clone, Default)]
pub struct CentroidClassifier {
    classes: Vec<(String, Vec<f32>)>,
}

impl CentroidClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class from example embeddings. Re-adding a name replaces it.
    pub fn add_class(&mut self, name: impl Into<String>, examples: &[Vec<f32>]) -> Result<()> {
        let centroid = average_vector(examples)?;
        if let Some((_, existing)) = self.classes.first() {
            check_dims(existing, &centroid)?;
        }
        let name = name.into();
        match self.classes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = centroid,
            None => self.classes.push((name, centroid)),
        }
        Ok(())
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Classes with their similarity to `embedding`, most similar first.
    pub fn classify(&self, embedding: &[f32]) -> Result<Vec<(&str, f32)>> {
        if self.classes.is_empty() {
            return Err(ScoringError::Empty("classifier"));
        }
        let mut scores = self
            .classes
            .iter()
            .enumerate()
            .map(|(index, (_, centroid))| {
                cosine_similarity(centroid, embedding).map(|score| LabelScore { index, score })
            })
            .collect::<Result<Vec<_>>>()?;
        SortDescending.apply(&mut scores);
        Ok(scores
            .into_iter()
            .map(|s| (self.classes[s.index].0.as_str(), s.score))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_cosine() {
        assert_abs_diff_eq!(cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]).unwrap(), 1.0);
        assert_abs_diff_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).unwrap(), 0.0);
        assert_abs_diff_eq!(cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]).unwrap(), -1.0, epsilon = 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).unwrap(), 0.0);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_average_vector() {
        let avg = average_vector(&[vec![1.0, 2.0], vec![3.0, 6.0]]).unwrap();
        assert_eq!(avg, vec![2.0, 4.0]);
        assert_eq!(average_vector(&[]), Err(ScoringError::Empty("vector set")));
        assert!(average_vector(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_centroid_classifier() {
        let mut clf = CentroidClassifier::new();
        clf.add_class("sports", &[vec![1.0, 0.1, 0.0], vec![0.9, 0.0, 0.1]]).unwrap();
        clf.add_class("cooking", &[vec![0.0, 1.0, 0.2]]).unwrap();
        assert_eq!(clf.len(), 2);

        let ranked = clf.classify(&[0.8, 0.2, 0.0]).unwrap();
        assert_eq!(ranked[0].0, "sports");
        assert!(ranked[0].1 > ranked[1].1);

        assert!(clf.add_class("bad", &[vec![1.0]]).is_err());
        clf.add_class("cooking", &[vec![1.0, 0.0, 0.0]]).unwrap();
        assert_eq!(clf.len(), 2);
    }

    #[test]
    fn test_empty_classifier() {
        assert!(matches!(
            CentroidClassifier::new().classify(&[1.0]),
            Err(ScoringError::Empty(_))
        ));
    }
}
