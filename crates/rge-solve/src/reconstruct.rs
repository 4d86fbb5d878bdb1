use nalgebra::DMatrix;
use num_complex::Complex64;
use rge_core::{CouplingKind, ErrorInfo, RgeError};

use crate::trajectory::{MatrixTrajectory, MatrixValue, Trajectory};

fn shape_error(code: &str, message: impl Into<String>, coupling: &str) -> RgeError {
    RgeError::ShapeMismatch(ErrorInfo::new(code, message).with_context("coupling", coupling))
}

/// Rebuilds the series of a `rows x cols` matrix coupling from its element
/// trajectories, given in row-major order.
///
/// Every sample becomes complex once any element is complex.
pub fn reconstruct_matrix(
    name: &str,
    kind: CouplingKind,
    rows: usize,
    cols: usize,
    elements: &[&Trajectory],
) -> Result<MatrixTrajectory, RgeError> {
    if elements.len() != rows * cols {
        return Err(shape_error("element-count", "element series do not fill the matrix", name)
            .with_context("expected", rows * cols)
            .with_context("found", elements.len()));
    }
    let samples = elements.first().map_or(0, |first| first.values.len());
    if let Some(short) = elements.iter().find(|element| element.values.len() != samples) {
        return Err(shape_error("series-length", "element series differ in length", name)
            .with_context("element", &short.name)
            .with_context("expected", samples)
            .with_context("found", short.values.len()));
    }

    let is_complex = elements.iter().any(|element| element.is_complex);
    let values = (0..samples)
        .map(|k| {
            if is_complex {
                MatrixValue::Complex(DMatrix::from_row_iterator(
                    rows,
                    cols,
                    elements.iter().map(|element| element.values[k].to_complex()),
                ))
            } else {
                MatrixValue::Real(DMatrix::from_row_iterator(
                    rows,
                    cols,
                    elements.iter().map(|element| element.values[k].re()),
                ))
            }
        })
        .collect();

    Ok(MatrixTrajectory {
        name: name.to_string(),
        kind,
        rows,
        cols,
        is_complex,
        values,
    })
}

/// Entries of a rebuilt sample in row-major order.
pub fn row_major(value: &MatrixValue) -> Vec<Complex64> {
    let (rows, cols) = value.dims();
    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .filter_map(|(r, c)| value.get(r, c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rge_core::Value;

    fn series(name: &str, values: Vec<Value>, is_complex: bool) -> Trajectory {
        Trajectory {
            name: name.to_string(),
            kind: CouplingKind::Yukawas,
            position: 0,
            parent: "Y".to_string(),
            is_complex,
            promoted_at: None,
            values,
        }
    }

    #[test]
    fn rebuilds_row_major_matrices() {
        let a = series("Y_{11}", vec![Value::Real(1.0), Value::Real(5.0)], false);
        let b = series("Y_{12}", vec![Value::Real(2.0), Value::Real(6.0)], false);
        let c = series("Y_{21}", vec![Value::Real(3.0), Value::Real(7.0)], false);
        let d = series("Y_{22}", vec![Value::Real(4.0), Value::Real(8.0)], false);
        let matrix = reconstruct_matrix("Y", CouplingKind::Yukawas, 2, 2, &[&a, &b, &c, &d]).unwrap();
        assert!(!matrix.is_complex);
        assert_eq!(matrix.values.len(), 2);
        assert_eq!(matrix.values[1].get(1, 0), Some(Complex64::new(7.0, 0.0)));
        assert_eq!(
            row_major(&matrix.values[0]),
            vec![1.0, 2.0, 3.0, 4.0]
                .into_iter()
                .map(|re| Complex64::new(re, 0.0))
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn one_complex_element_makes_the_matrix_complex() {
        let a = series("Y_{11}", vec![Value::Real(1.0)], false);
        let b = series("Y_{12}", vec![Value::Complex(Complex64::new(0.0, 2.0))], true);
        let matrix = reconstruct_matrix("Y", CouplingKind::Yukawas, 1, 2, &[&a, &b]).unwrap();
        assert!(matrix.is_complex);
        assert!(matches!(matrix.values[0], MatrixValue::Complex(_)));
        assert_eq!(matrix.values[0].get(0, 1), Some(Complex64::new(0.0, 2.0)));
    }

    #[test]
    fn mismatched_inputs_are_shape_errors() {
        let a = series("Y_{11}", vec![Value::Real(1.0)], false);
        let b = series("Y_{12}", vec![Value::Real(1.0), Value::Real(2.0)], false);
        let err = reconstruct_matrix("Y", CouplingKind::Yukawas, 2, 2, &[&a, &b]).unwrap_err();
        assert_eq!(err.info().code, "element-count");
        let err = reconstruct_matrix("Y", CouplingKind::Yukawas, 1, 2, &[&a, &b]).unwrap_err();
        assert!(matches!(err, RgeError::ShapeMismatch(_)));
        assert_eq!(err.info().code, "series-length");
    }
}
