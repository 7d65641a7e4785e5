/// Splits `input` on commas and trims every entry, dropping entries left empty.
///
/// Order and duplicates are kept: `"a, b, b"` becomes `["a", "b", "b"]`.
#[must_use]
pub fn split_terms(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Normalizes tags that arrived either as one comma-separated value or as repeated values.
#[must_use]
pub fn normalize_tags<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| split_terms(value.as_ref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{normalize_tags, split_terms};

    #[test]
    fn duplicates_survive_trimming() {
        assert_eq!(split_terms("a, b, b"), ["a", "b", "b"]);
    }

    #[test]
    fn empty_entries_are_dropped() {
        assert_eq!(split_terms(" , react,,  "), ["react"]);
        assert!(split_terms("").is_empty());
    }

    #[test]
    fn repeated_values_are_concatenated() {
        assert_eq!(
            normalize_tags(&["rust", " web , api", ""]),
            ["rust", "web", "api"]
        );
    }
}
