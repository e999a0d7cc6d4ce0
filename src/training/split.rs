//! Seeded train/test split

use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::TrainingError;

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `n_samples` row indices with `seed` and hold out `ceil(test_size * n)`
///
/// Both sides must end up non-empty.
pub fn train_test_split(
    n_samples: usize,
    test_size: f64,
    seed: u64,
) -> Result<Split, TrainingError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TrainingError::InvalidTestSize(test_size));
    }

    let n_test = (test_size * n_samples as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(TrainingError::InsufficientData {
            required: 2,
            actual: n_samples,
        });
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(Split {
        train,
        test: indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_split_sizes() {
        let split = train_test_split(13, 0.3, 37).unwrap();
        assert_eq!(split.test.len(), 4);
        assert_eq!(split.train.len(), 9);
    }

    #[test]
    fn test_split_is_a_partition() {
        let split = train_test_split(20, 0.25, 1).unwrap();
        let all: BTreeSet<usize> = split.train.iter().chain(split.test.iter()).copied().collect();
        assert_eq!(all.len(), 20);
        assert_eq!(all, (0..20).collect::<BTreeSet<usize>>());
    }

    #[test]
    fn test_split_reproducible() {
        assert_eq!(
            train_test_split(13, 0.3, 37).unwrap(),
            train_test_split(13, 0.3, 37).unwrap()
        );
    }

    #[test]
    fn test_invalid_test_size() {
        assert!(matches!(
            train_test_split(10, 0.0, 1),
            Err(TrainingError::InvalidTestSize(_))
        ));
        assert!(train_test_split(10, 1.0, 1).is_err());
        assert!(train_test_split(10, f64::NAN, 1).is_err());
    }

    #[test]
    fn test_too_few_rows() {
        assert!(matches!(
            train_test_split(1, 0.3, 1),
            Err(TrainingError::InsufficientData { .. })
        ));
        assert!(train_test_split(0, 0.3, 1).is_err());
    }
}
