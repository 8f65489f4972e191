// Matrix Expansion
// Expands a flow's parametrization table into concrete environment overlays

use crate::environment::Environment;

use std::fmt;

/// One row of a flow's matrix: bind `local` to each candidate of `source`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixEntry {
    /// Local variable name bound in each combination
    pub local: String,
    /// Environment variable whose candidate set is expanded
    pub source: String,
}

impl MatrixEntry {
    pub fn new(local: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            source: source.into(),
        }
    }
}

/// A single matrix combination: ordered local bindings, one per matrix entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Combination {
    bindings: Vec<(String, String)>,
}

impl Combination {
    /// The empty combination (produced by an empty matrix)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bindings in matrix declaration order
    pub fn bindings(&self) -> &[(String, String)] {
        &self.bindings
    }

    /// Value bound to `name` in this combination
    pub fn get(&self, name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Overlay the bindings onto `env` as local variables
    pub fn apply(&self, env: &mut Environment) {
        for (name, value) in &self.bindings {
            env.set_local(name.clone(), value.clone());
        }
    }

    fn extended(&self, name: &str, value: &str) -> Self {
        let mut bindings = self.bindings.clone();
        // A repeated local name rebinds rather than duplicates
        bindings.retain(|(k, _)| k != name);
        bindings.push((name.to_string(), value.to_string()));
        Self { bindings }
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .bindings
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        write!(f, "{{{}}}", rendered.join(" "))
    }
}

/// Matrix expander for flows
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand `matrix` against the candidate sets found in `env`.
    ///
    /// Entries are processed in declaration order and candidates in the order
    /// they are stored, so the output is reproducible. The result holds the
    /// cartesian product of all candidate sets; an empty matrix yields exactly
    /// one empty combination, and an entry whose source has no candidates
    /// yields none at all.
    pub fn expand(matrix: &[MatrixEntry], env: &Environment) -> Vec<Combination> {
        let mut expanded = vec![Combination::empty()];

        for entry in matrix {
            let values = env.all(&entry.source);
            expanded = expanded
                .iter()
                .flat_map(|partial| {
                    values
                        .iter()
                        .map(move |value| partial.extended(&entry.local, value))
                })
                .collect();
        }

        expanded
    }

    /// Number of combinations `expand` would produce
    pub fn count(matrix: &[MatrixEntry], env: &Environment) -> usize {
        matrix
            .iter()
            .map(|entry| env.all(&entry.source).len())
            .product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        let mut env = Environment::new();
        env.set("REGIONS", ["us", "eu"]);
        env.set("PLATFORMS", ["go", "python", "ruby"]);
        env.set("TEAM", ["admin"]);
        env
    }

    #[test]
    fn test_empty_matrix_yields_one_empty_combination() {
        let combos = MatrixExpander::expand(&[], &env());
        assert_eq!(combos, vec![Combination::empty()]);
        assert_eq!(MatrixExpander::count(&[], &env()), 1);
    }

    #[test]
    fn test_cartesian_product_size() {
        let matrix = vec![
            MatrixEntry::new("region", "REGIONS"),
            MatrixEntry::new("platform", "PLATFORMS"),
            MatrixEntry::new("team", "TEAM"),
        ];
        let combos = MatrixExpander::expand(&matrix, &env());

        assert_eq!(combos.len(), 2 * 3);
        assert_eq!(MatrixExpander::count(&matrix, &env()), 6);
        for combo in &combos {
            assert_eq!(combo.bindings().len(), 3);
            assert_eq!(combo.get("team"), Some("admin"));
        }
    }

    #[test]
    fn test_expansion_order_is_declaration_order() {
        let matrix = vec![
            MatrixEntry::new("region", "REGIONS"),
            MatrixEntry::new("platform", "PLATFORMS"),
        ];
        let rendered: Vec<String> = MatrixExpander::expand(&matrix, &env())
            .iter()
            .map(|c| c.to_string())
            .collect();

        assert_eq!(
            rendered,
            vec![
                "{region=us platform=go}",
                "{region=us platform=python}",
                "{region=us platform=ruby}",
                "{region=eu platform=go}",
                "{region=eu platform=python}",
                "{region=eu platform=ruby}",
            ]
        );
    }

    #[test]
    fn test_missing_source_yields_nothing() {
        let matrix = vec![
            MatrixEntry::new("region", "REGIONS"),
            MatrixEntry::new("zone", "ZONES"),
        ];
        assert!(MatrixExpander::expand(&matrix, &env()).is_empty());
        assert_eq!(MatrixExpander::count(&matrix, &env()), 0);
    }

    #[test]
    fn test_apply_overlays_local_bindings() {
        let matrix = vec![MatrixEntry::new("REGIONS", "REGIONS")];
        let combos = MatrixExpander::expand(&matrix, &env());

        let mut overlay = env();
        combos[1].apply(&mut overlay);
        assert_eq!(overlay.all("REGIONS"), vec!["eu".to_string()]);
    }

    #[test]
    fn test_repeated_local_name_rebinds() {
        let matrix = vec![
            MatrixEntry::new("x", "TEAM"),
            MatrixEntry::new("x", "REGIONS"),
        ];
        let combos = MatrixExpander::expand(&matrix, &env());
        assert_eq!(combos.len(), 2);
        assert_eq!(combos[0].bindings().len(), 1);
        assert_eq!(combos[0].get("x"), Some("us"));
    }
}
