//! Synthetic name allocation.
//!
//! Both allocators live for exactly one compilation unit. Nothing here is
//! shared across units, so two compilations never observe each other's names.

use crate::tree::NodeId;
use std::collections::HashMap;

pub const DEFAULT_TEMP_PREFIX: &str = "fnl_tmp";

/// Stable temp names keyed by node: `<prefix>_<n>` where `n` counts the names
/// minted before this one.
#[derive(Debug, Clone)]
pub struct DeterministicNames {
    prefix: String,
    generated: HashMap<NodeId, String>,
}

impl Default for DeterministicNames {
    fn default() -> Self {
        Self::new(DEFAULT_TEMP_PREFIX)
    }
}

impl DeterministicNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            generated: HashMap::new(),
        }
    }

    pub fn generate_or_get(&mut self, node: NodeId) -> String {
        let next = self.generated.len();
        self.generated
            .entry(node)
            .or_insert_with(|| format!("{}_{next}", self.prefix))
            .clone()
    }

    pub fn get(&self, node: NodeId) -> Option<&str> {
        self.generated.get(&node).map(String::as_str)
    }

    /// True when `name` has the shape of a name this allocator mints,
    /// whether or not it has been minted yet.
    pub fn owns(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
    }

    pub fn len(&self) -> usize {
        self.generated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generated.is_empty()
    }
}

/// Collision-free renaming of user-chosen names.
///
/// The first request for a base returns the base itself. Later requests
/// advance the base's counter and ask the formatter for a candidate until one
/// is found that was never handed out. Every returned name is registered, so
/// a generated `a_1` also blocks a later literal request for `a_1`.
pub struct UniqueNames<F = fn(&str, u32) -> String>
where
    F: Fn(&str, u32) -> String,
{
    formatter: F,
    counts: HashMap<String, u32>,
}

/// `name_<n>`
pub fn underscore_suffix(base: &str, n: u32) -> String {
    format!("{base}_{n}")
}

impl Default for UniqueNames {
    fn default() -> Self {
        Self::new(underscore_suffix)
    }
}

impl<F> UniqueNames<F>
where
    F: Fn(&str, u32) -> String,
{
    pub fn new(formatter: F) -> Self {
        Self {
            formatter,
            counts: HashMap::new(),
        }
    }

    pub fn get_unique(&mut self, base: &str) -> String {
        let Some(&seen) = self.counts.get(base) else {
            self.counts.insert(base.to_string(), 0);
            return base.to_string();
        };

        let mut n = seen;
        let candidate = loop {
            n += 1;
            let candidate = (self.formatter)(base, n);
            if !self.counts.contains_key(&candidate) {
                break candidate;
            }
        };
        self.counts.insert(base.to_string(), n);
        self.counts.insert(candidate.clone(), 0);
        candidate
    }

    /// Mark `name` as taken without handing it out; a later request for it
    /// gets a formatted candidate.
    pub fn reserve(&mut self, name: &str) {
        self.counts.entry(name.to_string()).or_insert(0);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.counts.contains_key(name)
    }
}

impl<F> std::fmt::Debug for UniqueNames<F>
where
    F: Fn(&str, u32) -> String,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniqueNames")
            .field("counts", &self.counts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;

    #[test]
    fn test_deterministic_names_are_stable_per_node() {
        let mut b = TreeBuilder::new();
        let first = b.number(1.0);
        let second = b.number(2.0);
        let mut names = DeterministicNames::default();

        assert_eq!(names.generate_or_get(first), "fnl_tmp_0");
        assert_eq!(names.generate_or_get(second), "fnl_tmp_1");
        assert_eq!(names.generate_or_get(first), "fnl_tmp_0");
        assert_eq!(names.len(), 2);
        assert_eq!(names.get(second), Some("fnl_tmp_1"));
    }

    #[test]
    fn test_custom_prefix() {
        let mut b = TreeBuilder::new();
        let node = b.null();
        let mut names = DeterministicNames::new("tmp");
        assert_eq!(names.generate_or_get(node), "tmp_0");
    }

    #[test]
    fn test_owns_matches_minted_shape_only() {
        let names = DeterministicNames::new("tmp");
        assert!(names.owns("tmp_0"));
        assert!(names.owns("tmp_17"));
        assert!(!names.owns("tmp_"));
        assert!(!names.owns("tmp_0__1"));
        assert!(!names.owns("tmpx_0"));
        assert!(!names.owns("fnl_tmp_0"));
    }

    #[test]
    fn test_reserved_name_is_never_handed_out() {
        let mut names: UniqueNames = UniqueNames::default();
        names.reserve("fnl_tmp_0");
        assert!(names.contains("fnl_tmp_0"));
        assert_eq!(names.get_unique("fnl_tmp_0"), "fnl_tmp_0_1");
        names.reserve("fnl_tmp_0");
        assert_eq!(names.get_unique("fnl_tmp_0"), "fnl_tmp_0_2");
    }

    #[test]
    fn test_unique_names_skip_registered_candidates() {
        let mut names: UniqueNames = UniqueNames::default();
        assert_eq!(names.get_unique("a"), "a");
        assert_eq!(names.get_unique("a"), "a_1");
        assert_eq!(names.get_unique("a_1"), "a_1_1");
        assert_eq!(names.get_unique("a"), "a_2");
    }

    #[test]
    fn test_unique_names_with_custom_formatter() {
        let mut names = UniqueNames::new(|base: &str, n: u32| format!("{base} {n}"));
        assert_eq!(names.get_unique("Pass"), "Pass");
        assert_eq!(names.get_unique("Pass"), "Pass 1");
        assert_eq!(names.get_unique("Pass"), "Pass 2");
        assert!(names.contains("Pass 1"));
    }

    #[test]
    fn test_literal_request_collides_with_generated_name() {
        let mut names: UniqueNames = UniqueNames::default();
        assert_eq!(names.get_unique("x"), "x");
        assert_eq!(names.get_unique("x"), "x_1");
        // "x_1" was handed out already, so a literal request is renamed.
        assert_eq!(names.get_unique("x_1"), "x_1_1");
    }
}
