use std::collections::BTreeMap;

use num_complex::Complex64;
use rge_core::Shape;
use rge_expr::{evaluate, evaluate_real_constant, infer_shape, parse, Quantity};

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

fn bindings() -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    map.insert("g".to_string(), Quantity::real(0.5));
    map.insert("yt".to_string(), Quantity::Scalar(c(0.0, 2.0)));
    map.insert(
        "Y".to_string(),
        Quantity::from_row_major(2, 2, &[c(1.0, 0.0), c(0.0, 1.0), c(2.0, 0.0), c(3.0, -1.0)]).unwrap(),
    );
    map
}

#[test]
fn scalar_arithmetic() {
    let value = evaluate(&parse("2*g**3 - 1/g").unwrap(), &bindings()).unwrap();
    let z = value.as_scalar().unwrap();
    assert!((z.re - (2.0 * 0.125 - 2.0)).abs() < 1e-12);
    assert_eq!(z.im, 0.0);
}

#[test]
fn complex_scalars_and_constants() {
    let value = evaluate(&parse("conj(yt)*I + abs(yt)").unwrap(), &bindings()).unwrap();
    let z = value.as_scalar().unwrap();
    // conj(2i) * i = 2, abs(2i) = 2
    assert!((z - c(4.0, 0.0)).norm() < 1e-12);
}

#[test]
fn matrix_products_traces_and_adjoints() {
    let values = bindings();
    let trace = evaluate(&parse("tr(Y*adjoint(Y))").unwrap(), &values).unwrap();
    // Frobenius norm squared: 1 + 1 + 4 + 10
    assert!((trace.as_scalar().unwrap() - c(16.0, 0.0)).norm() < 1e-12);

    let product = evaluate(&parse("Y*transpose(Y)").unwrap(), &values).unwrap();
    let entries = product.row_major();
    // Row 0 of Y times column 0 of Y^T = 1*1 + i*i = 0
    assert!((entries[0] - c(0.0, 0.0)).norm() < 1e-12);
    assert_eq!(product.shape(), Shape::matrix(2, 2));
}

#[test]
fn matrix_integer_powers() {
    let values = bindings();
    let squared = evaluate(&parse("Y**2").unwrap(), &values).unwrap();
    let product = evaluate(&parse("Y*Y").unwrap(), &values).unwrap();
    assert_eq!(squared, product);
    let identity = evaluate(&parse("Y**0").unwrap(), &values).unwrap();
    assert_eq!(
        identity.row_major(),
        vec![c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0), c(1.0, 0.0)]
    );
    assert!(evaluate(&parse("Y**(-1)").unwrap(), &values).is_err());
}

#[test]
fn shape_errors_surface() {
    let values = bindings();
    let err = evaluate(&parse("Y + g").unwrap(), &values).unwrap_err();
    assert_eq!(err.info().code, "sum");
    let err = evaluate(&parse("missing*g").unwrap(), &values).unwrap_err();
    assert_eq!(err.info().code, "unbound-symbol");
}

#[test]
fn shape_inference_matches_evaluation() {
    let shape_of = |name: &String| match name.as_str() {
        "Y" => Some(Shape::matrix(2, 3)),
        "g" => Some(Shape::Scalar),
        _ => None,
    };
    assert_eq!(
        infer_shape(&parse("g*Y*adjoint(Y)").unwrap(), &shape_of).unwrap(),
        Shape::matrix(2, 2)
    );
    assert_eq!(
        infer_shape(&parse("tr(adjoint(Y)*Y)").unwrap(), &shape_of).unwrap(),
        Shape::Scalar
    );
    let err = infer_shape(&parse("Y*Y").unwrap(), &shape_of).unwrap_err();
    assert_eq!(err.info().code, "product");
    let err = infer_shape(&parse("Y + g").unwrap(), &shape_of).unwrap_err();
    assert_eq!(err.info().code, "sum");
}

#[test]
fn real_constants() {
    let value = evaluate_real_constant(&parse("(4*pi)**2").unwrap()).unwrap();
    assert!((value - 16.0 * std::f64::consts::PI.powi(2)).abs() < 1e-9);
    assert!(evaluate_real_constant(&parse("g**2").unwrap()).is_err());
    assert!(evaluate_real_constant(&parse("I").unwrap()).is_err());
}
