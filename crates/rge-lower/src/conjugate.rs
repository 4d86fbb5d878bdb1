use rge_core::{ErrorInfo, RgeError};

const CONJUGATE_SUFFIXES: [&str; 3] = ["^{*}", "^*", "star"];

/// Whether `name` denotes the complex conjugate of another coupling.
pub fn is_conjugate_name(name: &str) -> bool {
    CONJUGATE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Finds the coupling a conjugate name refers to.
///
/// The canonical coupling is the longest candidate contained in `name`; it
/// must be strictly longer than every other contained candidate. This is a
/// best-effort heuristic: `ab^*` with candidates `a` and `b` is ambiguous.
pub fn resolve_conjugate<'a, I>(name: &str, candidates: I) -> Result<&'a str, RgeError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut contained: Vec<&'a str> = candidates
        .into_iter()
        .filter(|candidate| !candidate.is_empty() && *candidate != name && name.contains(*candidate))
        .collect();
    contained.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    contained.dedup();

    match contained.as_slice() {
        [] => Err(RgeError::AmbiguousConjugate(
            ErrorInfo::new("no-candidate", "no declared coupling matches the conjugate name")
                .with_context("name", name),
        )),
        [only] => Ok(*only),
        [first, second, ..] if first.len() > second.len() => Ok(*first),
        [first, second, ..] => Err(RgeError::AmbiguousConjugate(
            ErrorInfo::new("tie", "several couplings match the conjugate name equally well")
                .with_context("name", name)
                .with_context("first", first)
                .with_context("second", second)
                .with_hint("rename the couplings so that one name is strictly longer"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_suffixes() {
        assert!(is_conjugate_name("yt^*"));
        assert!(is_conjugate_name("Yu^{*}"));
        assert!(is_conjugate_name("lambdastar"));
        assert!(!is_conjugate_name("yt"));
        assert!(!is_conjugate_name("star_"));
    }

    #[test]
    fn prefers_the_longest_candidate() {
        let names = ["lambda", "lambda1", "g1"];
        assert_eq!(resolve_conjugate("lambda1^*", names).unwrap(), "lambda1");
        assert_eq!(resolve_conjugate("lambdastar", names).unwrap(), "lambda");
    }

    #[test]
    fn ties_are_ambiguous() {
        let err = resolve_conjugate("ab^*", ["a", "b"]).unwrap_err();
        assert!(matches!(err, RgeError::AmbiguousConjugate(_)));
        assert_eq!(err.info().code, "tie");
        let err = resolve_conjugate("zz^*", ["a", "b"]).unwrap_err();
        assert_eq!(err.info().code, "no-candidate");
    }
}
