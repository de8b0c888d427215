//! Name Resolver
//!
//! Export names are `prefix + artboard name` (or `document base + separator
//! + artboard name`) with every filesystem-illegal character substituted.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Characters never allowed in an export name.
pub const ILLEGAL_CHARS: [char; 12] =
    [':', '/', '\\', '*', '?', '"', '<', '>', '|', '\r', '\n', '.'];

pub fn is_illegal(c: char) -> bool {
    ILLEGAL_CHARS.contains(&c)
}

/// Strips the last dot-delimited segment, if it is non-empty.
///
/// `"poster.final.psd"` becomes `"poster.final"`; `"poster."` is unchanged.
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(pos) if pos + 1 < name.len() => &name[..pos],
        _ => name,
    }
}

pub fn sanitize(name: &str, substitute: char) -> String {
    name.chars()
        .map(|c| if is_illegal(c) { substitute } else { c })
        .collect()
}

/// Default prefix offered to the user: document base name plus separator.
pub fn suggested_prefix(document_name: &str, separator: &str) -> String {
    format!("{}{}", strip_extension(document_name), separator)
}

#[derive(Debug, Clone)]
pub struct NameResolver {
    substitute: char,
    separator: String,
}

impl NameResolver {
    pub fn new(substitute: char, separator: impl Into<String>) -> Self {
        Self {
            substitute,
            separator: separator.into(),
        }
    }

    pub fn resolve(&self, document_name: &str, layer_name: &str, prefix: Option<&str>) -> String {
        let joined = match prefix {
            Some(prefix) => format!("{}{}", prefix, layer_name),
            None => format!("{}{}{}", strip_extension(document_name), self.separator, layer_name),
        };
        sanitize(&joined, self.substitute)
    }
}

/// How repeated names within one run are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Later artboards silently overwrite earlier ones.
    #[default]
    Overwrite,
    /// Repeats get `-2`, `-3`, ... appended.
    Suffix,
}

/// Tracks the names handed out during one run.
#[derive(Debug, Default)]
pub struct NameRegistry {
    policy: CollisionPolicy,
    claimed: HashSet<String>,
    repeats: HashMap<String, usize>,
}

impl NameRegistry {
    pub fn new(policy: CollisionPolicy) -> Self {
        Self {
            policy,
            ..Default::default()
        }
    }

    pub fn claim(&mut self, name: String) -> String {
        if self.policy == CollisionPolicy::Overwrite || !self.claimed.contains(&name) {
            if self.claimed.contains(&name) {
                tracing::warn!(name = %name, "Export name repeats within run, file will be overwritten");
            }
            self.claimed.insert(name.clone());
            return name;
        }

        let counter = self.repeats.entry(name.clone()).or_insert(1);
        loop {
            *counter += 1;
            let candidate = format!("{}-{}", name, counter);
            if !self.claimed.contains(&candidate) {
                self.claimed.insert(candidate.clone());
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("poster.psd"), "poster");
        assert_eq!(strip_extension("poster.final.psd"), "poster.final");
        assert_eq!(strip_extension("poster"), "poster");
        assert_eq!(strip_extension("poster."), "poster.");
        assert_eq!(strip_extension(".psd"), "");
    }

    #[test]
    fn test_resolve_with_prefix() {
        let resolver = NameResolver::new('_', " - ");
        let name = resolver.resolve("Poster.psd", "Hero: v2.1", Some("Poster_"));
        assert_eq!(name, "Poster_Hero_ v2_1");
    }

    #[test]
    fn test_resolve_without_prefix() {
        let resolver = NameResolver::new('-', " - ");
        let name = resolver.resolve("Poster.psd", "A/B", None);
        assert_eq!(name, "Poster - A-B");
    }

    #[test]
    fn test_prefix_is_sanitized_too() {
        let resolver = NameResolver::new('_', " - ");
        assert_eq!(resolver.resolve("x.psd", "Hero", Some("v1.0|")), "v1_0_Hero");
    }

    #[test]
    fn test_suggested_prefix() {
        assert_eq!(suggested_prefix("Poster.psd", "_"), "Poster_");
    }

    #[test]
    fn test_registry_overwrite_keeps_names() {
        let mut registry = NameRegistry::new(CollisionPolicy::Overwrite);
        assert_eq!(registry.claim("a".into()), "a");
        assert_eq!(registry.claim("a".into()), "a");
    }

    #[test]
    fn test_registry_suffix_skips_taken_names() {
        let mut registry = NameRegistry::new(CollisionPolicy::Suffix);
        assert_eq!(registry.claim("a-2".into()), "a-2");
        assert_eq!(registry.claim("a".into()), "a");
        assert_eq!(registry.claim("a".into()), "a-3");
        assert_eq!(registry.claim("a".into()), "a-4");
    }
}
