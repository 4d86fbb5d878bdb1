use rge_core::{CouplingKind, RgeError, Shape};
use rge_lower::{lower_model, InitialValue, ModelSpec};

const YAML: &str = r#"
name: ToySM
couplings:
  - name: g1
    kind: GaugeCouplings
    initial: 0.46
  - name: Yu
    kind: Yukawas
    shape:
      matrix: { rows: 2, cols: 2 }
    initial: [[0.9, 0.0], [0.0, 0.1]]
  - name: lambda
    kind: QuarticTerms
    initial: { re: 0.13, im: 0.0 }
rges:
  GaugeCouplings:
    1: { g1: "41/10*g1**3" }
  Yukawas:
    1: { Yu: "3/2*Yu*adjoint(Yu)*Yu - 17/20*g1**2*Yu" }
  QuarticTerms:
    1: { lambda: "24*lambda**2 - 6*tr(Yu*adjoint(Yu)*Yu*adjoint(Yu))" }
loops:
  GaugeCouplings: 1
  Yukawas: 1
  QuarticTerms: 1
"#;

#[test]
fn yaml_models_load_with_defaults() {
    let spec = ModelSpec::from_yaml_str(YAML).unwrap();
    assert_eq!(spec.name, "ToySM");
    assert_eq!(spec.beta_factor, "1");
    assert_eq!(spec.beta_exponent, "2*n");
    assert_eq!(spec.generations, 3.0);
    assert_eq!(spec.couplings[1].shape, Shape::matrix(2, 2));
    assert_eq!(
        spec.couplings[1].initial,
        Some(InitialValue::Matrix(vec![vec![0.9, 0.0], vec![0.0, 0.1]]))
    );
    assert_eq!(spec.couplings[2].initial, Some(InitialValue::Complex { re: 0.13, im: 0.0 }));

    let lowered = lower_model(&spec).unwrap();
    assert_eq!(lowered.registry.total_elements(), 6);
    assert_eq!(lowered.system.len(), 3);
    assert_eq!(lowered.loops.get(&CouplingKind::Yukawas), Some(&1));
}

#[test]
fn json_round_trip_preserves_the_model() {
    let spec = ModelSpec::from_yaml_str(YAML).unwrap();
    let json = serde_json::to_string(&spec).unwrap();
    let restored = ModelSpec::from_json_str(&json).unwrap();
    assert_eq!(restored, spec);
}

#[test]
fn malformed_models_are_serde_errors() {
    let err = ModelSpec::from_yaml_str("name: [unterminated").unwrap_err();
    assert!(matches!(err, RgeError::Serde(_)));
    let err = ModelSpec::from_json_str("{\"couplings\": 3}").unwrap_err();
    assert!(matches!(err, RgeError::Serde(_)));
}
