use rge_expr::{parse, Expr, Func};

#[test]
fn parses_precedence_and_unary_minus() {
    let expr = parse("-41/6*g1**3 + 2*g1").unwrap();
    let Expr::Add(terms) = &expr else {
        panic!("expected a sum, got {expr:?}");
    };
    assert_eq!(terms.len(), 2);
    let Expr::Mul(factors) = &terms[0] else {
        panic!("expected a product, got {:?}", terms[0]);
    };
    assert_eq!(factors[0], Expr::Num(-41.0));
    assert_eq!(factors[1], Expr::Num(6.0).powi(-1));
    assert_eq!(factors[2], Expr::sym("g1").powi(3));
}

#[test]
fn power_is_right_associative_and_binds_tighter_than_minus() {
    assert_eq!(
        parse("2**3**2").unwrap(),
        Expr::<String>::Num(2.0).pow(Expr::Num(3.0).pow(Expr::Num(2.0)))
    );
    assert_eq!(parse("-x**2").unwrap(), -Expr::sym("x").powi(2));
    assert_eq!(parse("x^2").unwrap(), Expr::sym("x").powi(2));
}

#[test]
fn functions_and_constants() {
    let expr = parse("tr(adjoint(Yu)*Yu)*pi + I*conjugate(yt)").unwrap();
    assert!(expr.contains_call(Func::Trace));
    assert!(expr.contains_call(Func::Adjoint));
    assert!(expr.contains_call(Func::Conj));
    let symbols: Vec<&String> = expr.symbols();
    assert_eq!(symbols, vec!["Yu", "yt"]);
}

#[test]
fn conjugate_names_are_single_symbols() {
    let expr = parse("yt^**yt + Yu_{11}^{*}").unwrap();
    let symbols: Vec<&str> = expr.symbols().into_iter().map(String::as_str).collect();
    assert_eq!(symbols, vec!["yt^*", "yt", "Yu_{11}^{*}"]);
}

#[test]
fn display_reparses_to_the_same_tree() {
    for source in [
        "g1**3",
        "-41/6*g1**3 + tr(adjoint(Yu)*Yu)*g1",
        "(a + b)*c**(-2)",
        "abs(yt)**2*xiGauge",
        "sqrt(3/5)*g1",
    ] {
        let expr = parse(source).unwrap();
        let printed = expr.to_string();
        let reparsed = parse(&printed).unwrap();
        assert_eq!(expr, reparsed, "source={source} printed={printed}");
    }
}

#[test]
fn rejects_malformed_input() {
    for source in ["g1 +", "foo(x)", "(g1", "g1 $ 2", "g1 g2"] {
        let err = parse(source).unwrap_err();
        assert_eq!(err.info().code, "parse", "source={source}");
    }
}
