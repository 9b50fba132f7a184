//! Artifact registry
//!
//! The registry is the hand-authored, ordered list of artifacts a run deploys.
//! Its order is the deployment order: every [`ArgRef::AddressOf`] must point to
//! an artifact declared earlier. [`Registry::validate`] asserts this before any
//! network call is made, so the resolver can rely on a single linear pass.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A constructor argument template entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgRef {
    /// The address of a previously deployed artifact, e.g. `{ address_of = "Token" }`
    AddressOf { address_of: String },
    /// Any literal value passed through unchanged
    Literal(serde_json::Value),
}

impl ArgRef {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        ArgRef::Literal(value.into())
    }

    pub fn address_of(name: impl Into<String>) -> Self {
        ArgRef::AddressOf {
            address_of: name.into(),
        }
    }

    /// Name of the artifact this argument depends on, if any
    pub fn dependency(&self) -> Option<&str> {
        match self {
            ArgRef::AddressOf { address_of } => Some(address_of),
            ArgRef::Literal(_) => None,
        }
    }
}

/// Static description of one deployable artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub name: String,
    /// Fully qualified source name, e.g. `contracts/Swap.sol:Swap`
    #[serde(rename = "source")]
    pub source_locator: String,
    #[serde(default, rename = "args")]
    pub constructor_args: Vec<ArgRef>,
}

impl ArtifactSpec {
    pub fn new(name: impl Into<String>, source_locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_locator: source_locator.into(),
            constructor_args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<ArgRef>) -> Self {
        self.constructor_args = args;
        self
    }

    /// Names of the artifacts whose addresses feed this constructor
    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.constructor_args.iter().filter_map(ArgRef::dependency)
    }

    /// Split the source locator into `(source path, contract name)`
    pub fn source_parts(&self) -> Option<(&str, &str)> {
        self.source_locator
            .rsplit_once(':')
            .filter(|(path, contract)| !path.is_empty() && !contract.is_empty())
    }
}

/// Ordered collection of artifact specs; order is deployment order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registry {
    specs: Vec<ArtifactSpec>,
}

impl Registry {
    pub fn new(specs: Vec<ArtifactSpec>) -> Self {
        Self { specs }
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArtifactSpec> {
        self.specs.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ArtifactSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.specs.iter().position(|s| s.name == name)
    }

    /// Check that the declared order is a valid deployment order.
    ///
    /// Rejects empty or duplicate names, malformed source locators, and any
    /// reference that is unknown, self-referential or points forward.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::new();

        for (index, spec) in self.specs.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(Error::config(format!(
                    "Artifact #{} has an empty name",
                    index
                )));
            }

            if spec.source_parts().is_none() {
                return Err(Error::config(format!(
                    "Artifact '{}' has invalid source '{}', expected '<path>:<Contract>'",
                    spec.name, spec.source_locator
                )));
            }

            for dependency in spec.dependencies() {
                if seen.contains(dependency) {
                    continue;
                }
                let reason = if dependency == spec.name {
                    "references its own address"
                } else if self.position(dependency).is_some() {
                    "references an artifact declared after it"
                } else {
                    "references an unknown artifact"
                };
                return Err(Error::config(format!(
                    "Artifact '{}' {} ('{}')",
                    spec.name, reason, dependency
                )));
            }

            if !seen.insert(spec.name.as_str()) {
                return Err(Error::config(format!(
                    "Artifact '{}' is declared more than once",
                    spec.name
                )));
            }
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a ArtifactSpec;
    type IntoIter = std::slice::Iter<'a, ArtifactSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_registry() -> Registry {
        Registry::new(vec![
            ArtifactSpec::new("France", "contracts/Tokens.sol:France"),
            ArtifactSpec::new("Brasil", "contracts/Tokens.sol:Brasil"),
            ArtifactSpec::new("Swap", "contracts/Swap.sol:Swap").with_args(vec![
                ArgRef::address_of("France"),
                ArgRef::address_of("Brasil"),
            ]),
        ])
    }

    #[test]
    fn test_valid_registry() {
        let registry = pool_registry();
        assert!(registry.validate().is_ok());
        assert_eq!(registry.len(), 3);

        let swap = registry.get("Swap").unwrap();
        let deps: Vec<_> = swap.dependencies().collect();
        assert_eq!(deps, vec!["France", "Brasil"]);
    }

    #[test]
    fn test_forward_reference_rejected() {
        let registry = Registry::new(vec![
            ArtifactSpec::new("Swap", "contracts/Swap.sol:Swap")
                .with_args(vec![ArgRef::address_of("France")]),
            ArtifactSpec::new("France", "contracts/Tokens.sol:France"),
        ]);

        let err = registry.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("declared after"));
    }

    #[test]
    fn test_self_reference_rejected() {
        let registry = Registry::new(vec![ArtifactSpec::new("Loop", "contracts/Loop.sol:Loop")
            .with_args(vec![ArgRef::address_of("Loop")])]);

        let err = registry.validate().unwrap_err();
        assert!(err.to_string().contains("its own address"));
    }

    #[test]
    fn test_unknown_reference_rejected() {
        let registry = Registry::new(vec![ArtifactSpec::new("Swap", "contracts/Swap.sol:Swap")
            .with_args(vec![ArgRef::address_of("Missing")])]);

        let err = registry.validate().unwrap_err();
        assert!(err.to_string().contains("unknown artifact"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = Registry::new(vec![
            ArtifactSpec::new("Token", "contracts/Token.sol:Token"),
            ArtifactSpec::new("Token", "contracts/Token.sol:Token"),
        ]);

        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_invalid_source_locator_rejected() {
        let registry = Registry::new(vec![ArtifactSpec::new("Token", "Token")]);
        assert!(registry.validate().is_err());

        let registry = Registry::new(vec![ArtifactSpec::new("Token", "contracts/Token.sol:")]);
        assert!(registry.validate().is_err());
    }

    #[test]
    fn test_source_parts() {
        let spec = ArtifactSpec::new("Swap", "contracts/Swap.sol:Swap");
        assert_eq!(spec.source_parts(), Some(("contracts/Swap.sol", "Swap")));
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct File {
            artifacts: Registry,
        }

        let content = r#"
[[artifacts]]
name = "France"
source = "contracts/Tokens.sol:France"

[[artifacts]]
name = "Swap"
source = "contracts/Swap.sol:Swap"
args = [{ address_of = "France" }, "fee", 30]
"#;

        let file: File = toml::from_str(content).unwrap();
        let registry = file.artifacts;

        assert_eq!(registry.len(), 2);
        assert!(registry.get("France").unwrap().constructor_args.is_empty());

        let swap = registry.get("Swap").unwrap();
        assert_eq!(
            swap.constructor_args,
            vec![
                ArgRef::address_of("France"),
                ArgRef::literal("fee"),
                ArgRef::literal(30),
            ]
        );
    }
}
