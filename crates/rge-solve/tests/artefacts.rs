use rge_core::{CouplingKind, RgeError, Value};
use rge_lower::{CouplingSpec, InitialValue, ModelSpec};
use rge_solve::serde_io::{
    config_from_json, config_to_json, initial_conditions_from_json, initial_conditions_to_json, model_from_json,
    model_to_json, solution_from_json, solution_to_json,
};
use rge_solve::{hash_initial_conditions, hash_solution, InitialEntry, RgeSolver, SolverConfig};

fn model() -> ModelSpec {
    ModelSpec::new("SM")
        .with_coupling(CouplingSpec::scalar("g1", CouplingKind::GaugeCouplings).with_initial(InitialValue::Real(0.46)))
        .with_coupling(
            CouplingSpec::matrix("Yu", CouplingKind::Yukawas, 2, 2)
                .with_initial(InitialValue::Matrix(vec![vec![1.0, 0.0], vec![0.0, 0.5]])),
        )
        .with_rge(CouplingKind::GaugeCouplings, 1, "g1", "41/10*g1**3")
        .with_rge(CouplingKind::Yukawas, 1, "Yu", "3/2*Yu*adjoint(Yu)*Yu - 17/20*g1**2*Yu")
        .with_loops(CouplingKind::GaugeCouplings, 1)
        .with_loops(CouplingKind::Yukawas, 1)
}

fn config() -> SolverConfig {
    SolverConfig::range(0.0, 0.0, 1.0).with_step(0.5)
}

#[test]
fn initial_conditions_dump_is_deterministic() {
    let solver = RgeSolver::new(&model(), config()).unwrap();
    let conditions = solver.initial_conditions();
    assert_eq!(conditions.sections.len(), 2);
    assert_eq!(conditions.sections[0].kind, CouplingKind::GaugeCouplings);
    assert_eq!(
        conditions.sections[0].couplings[0].value,
        InitialEntry::Scalar(Value::Real(0.46))
    );

    let expected = concat!(
        "\n# Running scheme :\n\n",
        "SM.loops = {'GaugeCouplings': 1,\n",
        "            'Yukawas': 1}\n",
        "\n# Gauge Couplings\n\n",
        "SM.g1.initialValue = 0.46\n",
        "\n# Yukawa Couplings\n\n",
        "SM.Yu.initialValue = [[1, 0],\n",
        "                      [0, 0.5]]\n",
    );
    assert_eq!(conditions.to_string(), expected);
    assert_eq!(conditions.to_string(), solver.initial_conditions().to_string());
}

#[test]
fn dump_follows_loop_edits() {
    let mut solver = RgeSolver::new(&model(), config()).unwrap();
    solver.set_all_loops(2);
    let dump = solver.initial_conditions().to_string();
    assert!(dump.contains("SM.loops = {'GaugeCouplings': 2,"));
    assert!(dump.contains("'Yukawas': 2}"));
}

#[test]
fn run_hash_is_reproducible() {
    let mut first = RgeSolver::new(&model(), config()).unwrap();
    let mut second = RgeSolver::new(&model(), config()).unwrap();
    let a = first.solve().unwrap().clone();
    let b = second.solve().unwrap();
    assert_eq!(a.run_hash.len(), 64);
    assert_eq!(a.run_hash, b.run_hash);
    assert_eq!(hash_solution(&a).unwrap(), a.run_hash);

    let mut other = RgeSolver::new(&model(), SolverConfig::range(0.0, 0.0, 1.0).with_step(0.25)).unwrap();
    assert_ne!(other.solve().unwrap().run_hash, a.run_hash);
}

#[test]
fn artefacts_survive_json() {
    let mut solver = RgeSolver::new(&model(), config()).unwrap();
    let solution = solver.solve().unwrap().clone();

    let json = solution_to_json(&solution).unwrap();
    let restored = solution_from_json(&json).unwrap();
    assert_eq!(restored.scales, solution.scales);
    assert_eq!(restored.run_hash, solution.run_hash);
    assert_eq!(restored.trajectories.len(), solution.trajectories.len());
    assert_eq!(restored.matrices[0].name, "Yu");
    for (a, b) in restored.trajectories.iter().zip(&solution.trajectories) {
        assert_eq!(a.name, b.name);
        for (x, y) in a.values.iter().zip(&b.values) {
            assert!((x.re() - y.re()).abs() <= 1e-15 * y.re().abs().max(1.0));
        }
    }

    let conditions = solver.initial_conditions();
    let restored = initial_conditions_from_json(&initial_conditions_to_json(&conditions).unwrap()).unwrap();
    assert_eq!(restored.to_string(), conditions.to_string());
    assert_eq!(
        hash_initial_conditions(&restored).unwrap(),
        hash_initial_conditions(&conditions).unwrap()
    );

    let spec = model();
    assert_eq!(model_from_json(&model_to_json(&spec).unwrap()).unwrap(), spec);
    let restored = config_from_json(&config_to_json(&config()).unwrap()).unwrap();
    assert_eq!(restored, config());
}

#[test]
fn malformed_json_is_a_serde_error() {
    let err = solution_from_json("{\"scales\": 3}").unwrap_err();
    assert!(matches!(err, RgeError::Serde(_)));
    assert_eq!(err.info().code, "solution-deserialize");
    assert_eq!(model_from_json("[]").unwrap_err().info().code, "model-deserialize");
}
