use num_complex::Complex64;
use proptest::prelude::*;
use rge_core::{CouplingKind, RgeError, Shape};
use rge_expr::Quantity;
use rge_registry::{CouplingRegistry, Declaration};

fn c(re: f64, im: f64) -> Complex64 {
    Complex64::new(re, im)
}

fn sample_registry() -> CouplingRegistry {
    let mut registry = CouplingRegistry::new();
    registry
        .declare(Declaration::scalar("g1", CouplingKind::GaugeCouplings).with_real(0.46))
        .unwrap();
    registry
        .declare(
            Declaration::matrix("Yu", CouplingKind::Yukawas, 2, 2).with_initial(
                Quantity::from_real_rows(&[vec![0.1, 0.2], vec![0.3, 0.4]]).unwrap(),
            ),
        )
        .unwrap();
    registry
        .declare(Declaration::scalar("g2", CouplingKind::GaugeCouplings).with_real(0.65))
        .unwrap();
    registry
        .declare(Declaration::scalar("lambda", CouplingKind::QuarticTerms).with_real(0.13))
        .unwrap();
    registry
}

#[test]
fn positions_follow_declaration_order() {
    let registry = sample_registry();
    let positions: Vec<usize> = registry.couplings().iter().map(|c| c.position).collect();
    assert_eq!(positions, vec![0, 1, 5, 6]);
    assert_eq!(registry.total_elements(), 7);
    assert_eq!(
        registry.kinds(),
        vec![CouplingKind::GaugeCouplings, CouplingKind::Yukawas, CouplingKind::QuarticTerms]
    );
}

#[test]
fn duplicate_names_are_rejected() {
    let mut registry = sample_registry();
    let err = registry
        .declare(Declaration::scalar("g1", CouplingKind::Yukawas))
        .unwrap_err();
    assert!(matches!(err, RgeError::Configuration(_)));
    assert_eq!(err.info().code, "duplicate-name");
    assert_eq!(registry.len(), 4);
}

#[test]
fn initial_value_shape_is_checked() {
    let mut registry = CouplingRegistry::new();
    let err = registry
        .declare(Declaration::matrix("Yd", CouplingKind::Yukawas, 3, 3).with_real(1.0))
        .unwrap_err();
    assert!(matches!(err, RgeError::ShapeMismatch(_)));

    let mut registry = sample_registry();
    assert!(registry.set_initial_value("g1", Quantity::real(0.5)).is_ok());
    assert!(registry.set_initial_value("Yu", Quantity::real(0.5)).is_err());
    assert!(registry.set_initial_value("nope", Quantity::real(0.5)).is_err());
    assert_eq!(registry.flatten()[0], c(0.5, 0.0));
}

#[test]
fn element_couplings_use_one_based_names() {
    let registry = sample_registry();
    let id = registry.id_of("Yu").unwrap();
    let elements = registry.elements_of(id).unwrap();
    let names: Vec<&str> = elements.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Yu_{11}", "Yu_{12}", "Yu_{21}", "Yu_{22}"]);
    let positions: Vec<usize> = elements.iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4]);
    assert!(elements.iter().all(|e| e.kind == CouplingKind::Yukawas && e.parent == id));
    assert!(registry.elements_of(registry.id_of("g1").unwrap()).unwrap().is_empty());
}

#[test]
fn flat_slots_cover_every_position() {
    let registry = sample_registry();
    let slots = registry.flat_couplings();
    let names: Vec<&str> = slots.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["g1", "Yu_{11}", "Yu_{12}", "Yu_{21}", "Yu_{22}", "g2", "lambda"]
    );
    for (index, slot) in slots.iter().enumerate() {
        assert_eq!(slot.position, index);
    }
    assert_eq!(slots[3].element, Some((1, 0)));
}

#[test]
fn extraction_is_ordered_by_declaration() {
    let registry = sample_registry();
    let flat = registry.flatten();
    let gauge = registry
        .extract_couplings(&flat, CouplingKind::GaugeCouplings)
        .unwrap();
    let names: Vec<&str> = gauge.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["g1", "g2"]);
    assert_eq!(gauge[1].1, Quantity::real(0.65));

    let yukawas = registry.extract_couplings(&flat, CouplingKind::Yukawas).unwrap();
    assert_eq!(yukawas[0].1.shape(), Shape::matrix(2, 2));
    assert!(registry
        .extract_couplings(&flat, CouplingKind::Vevs)
        .unwrap()
        .is_empty());
}

#[test]
fn unflatten_rejects_wrong_lengths() {
    let registry = sample_registry();
    let err = registry.unflatten(&[c(0.0, 0.0); 3]).unwrap_err();
    assert!(matches!(err, RgeError::ShapeMismatch(_)));
    assert_eq!(err.info().code, "flat-length");
}

#[test]
fn complex_flags_only_turn_on() {
    let mut registry = sample_registry();
    let yu = registry.id_of("Yu").unwrap();
    assert!(!registry.is_complex(yu));
    assert!(registry.mark_complex(2).unwrap());
    assert!(!registry.mark_complex(2).unwrap());
    assert!(registry.is_slot_complex(2));
    assert!(!registry.is_slot_complex(1));
    assert!(registry.is_complex(yu));
    assert!(!registry.is_complex(registry.id_of("g1").unwrap()));
    assert!(registry.mark_complex(99).is_err());
}

#[test]
fn complex_declarations_seed_their_slots() {
    let mut registry = CouplingRegistry::new();
    registry
        .declare(Declaration::scalar("g1", CouplingKind::GaugeCouplings))
        .unwrap();
    registry
        .declare(Declaration::matrix("Ye", CouplingKind::Yukawas, 1, 2).with_complex(true))
        .unwrap();
    assert_eq!(registry.complex_slots(), &[false, true, true]);
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    prop_oneof![
        Just(Shape::Scalar),
        (1usize..4, 1usize..4).prop_map(|(rows, cols)| Shape::matrix(rows, cols)),
    ]
}

fn build(shapes: &[Shape]) -> CouplingRegistry {
    let mut registry = CouplingRegistry::new();
    for (index, shape) in shapes.iter().enumerate() {
        let kind = CouplingKind::ALL[index % CouplingKind::ALL.len()];
        let declaration = match shape {
            Shape::Scalar => Declaration::scalar(format!("c{index}"), kind),
            Shape::Matrix { rows, cols } => Declaration::matrix(format!("c{index}"), kind, *rows, *cols),
        };
        registry.declare(declaration).unwrap();
    }
    registry
}

proptest! {
    #[test]
    fn positions_are_contiguous(shapes in prop::collection::vec(arb_shape(), 1..12)) {
        let registry = build(&shapes);
        let mut expected = 0;
        for coupling in registry.couplings() {
            prop_assert_eq!(coupling.position, expected);
            expected += coupling.element_count();
        }
        prop_assert_eq!(registry.total_elements(), expected);
        prop_assert_eq!(registry.flat_couplings().len(), expected);
    }

    #[test]
    fn flatten_unflatten_round_trip(
        shapes in prop::collection::vec(arb_shape(), 1..8),
        seed in prop::collection::vec((-10.0f64..10.0, -10.0f64..10.0), 64),
    ) {
        let registry = build(&shapes);
        let flat: Vec<Complex64> = (0..registry.total_elements())
            .map(|i| Complex64::new(seed[i % seed.len()].0, seed[i % seed.len()].1))
            .collect();
        let values = registry.unflatten(&flat).unwrap();
        for (coupling, value) in registry.couplings().iter().zip(&values) {
            prop_assert_eq!(value.shape(), coupling.shape);
        }
        prop_assert_eq!(registry.flatten_values(&values).unwrap(), flat);
    }
}
