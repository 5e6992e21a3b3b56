//! Marker value transforms.
//!
//! Produces the "transformed" matrix the SOM is trained on and that the
//! `flowSOM_clustering_tf_` table is written from. Rows are transformed in
//! parallel with Rayon.

use rayon::prelude::*;
use thiserror::Error;

use crate::config::TransformConfig;
use super::loaders::SampleTable;

/// Errors that can occur while transforming marker values.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("arcsinh cofactor must be positive, got {0}")]
    InvalidCofactor(f64),

    #[error("log transform needs positive values, found {value} at row {row}, column {column}")]
    NonPositive { row: usize, column: usize, value: f64 },
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// Apply a transform to every value of a row-major matrix.
///
/// `TransformConfig::None` returns a copy of the input.
pub fn transform_values(values: &[Vec<f64>], transform: &TransformConfig) -> Result<Vec<Vec<f64>>> {
    match *transform {
        TransformConfig::None => Ok(values.to_vec()),
        TransformConfig::Arcsinh { cofactor } => {
            if !(cofactor > 0.0) {
                return Err(TransformError::InvalidCofactor(cofactor));
            }
            Ok(values
                .par_iter()
                .map(|row| row.iter().map(|&v| (v / cofactor).asinh()).collect())
                .collect())
        }
        TransformConfig::Log => {
            // Find the first offending cell so the error is deterministic
            for (row, values_row) in values.iter().enumerate() {
                if let Some((column, &value)) =
                    values_row.iter().enumerate().find(|&(_, &v)| !(v > 0.0))
                {
                    return Err(TransformError::NonPositive { row, column, value });
                }
            }
            Ok(values
                .par_iter()
                .map(|row| row.iter().map(|&v| v.log10()).collect())
                .collect())
        }
    }
}

/// Fill `table.transformed` from `table.values`.
pub fn apply_transform(table: &mut SampleTable, transform: &TransformConfig) -> Result<()> {
    table.transformed = Some(transform_values(&table.values, transform)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_none_is_identity() {
        let values = vec![vec![1.5, -2.0], vec![0.0, 3.25]];
        let out = transform_values(&values, &TransformConfig::None).unwrap();
        assert_eq!(out, values);
    }

    #[test]
    fn test_transform_arcsinh() {
        let values = vec![vec![0.0, 5.0, -5.0]];
        let out = transform_values(&values, &TransformConfig::Arcsinh { cofactor: 5.0 }).unwrap();

        assert_eq!(out[0][0], 0.0);
        assert!((out[0][1] - 1.0f64.asinh()).abs() < 1e-12);
        assert!((out[0][2] + 1.0f64.asinh()).abs() < 1e-12);
    }

    #[test]
    fn test_transform_arcsinh_invalid_cofactor() {
        let values = vec![vec![1.0]];
        let result = transform_values(&values, &TransformConfig::Arcsinh { cofactor: 0.0 });
        assert!(matches!(result, Err(TransformError::InvalidCofactor(_))));
    }

    #[test]
    fn test_transform_log_rejects_non_positive() {
        let values = vec![vec![10.0, 100.0], vec![1.0, 0.0]];
        match transform_values(&values, &TransformConfig::Log) {
            Err(TransformError::NonPositive { row, column, .. }) => {
                assert_eq!((row, column), (1, 1));
            }
            other => panic!("Expected NonPositive, got {:?}", other),
        }

        let ok = transform_values(&values[..1], &TransformConfig::Log).unwrap();
        assert_eq!(ok[0], vec![1.0, 2.0]);
    }

    #[test]
    fn test_apply_transform_fills_table() {
        let mut table = SampleTable::from_values(
            "s.csv",
            vec!["a".into()],
            vec![vec![1.0], vec![2.0]],
        );
        apply_transform(&mut table, &TransformConfig::None).unwrap();
        assert_eq!(table.transformed.as_ref().unwrap().len(), 2);
        assert_eq!(table.training_values(), table.values.as_slice());
    }
}
