use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Hierarchical org-unit identifier made of whitespace separated tokens,
/// e.g. `TPD PRD MY TEST DEP1`.
///
/// Tokens are normalized on construction (runs of whitespace collapse to a single
/// space) and every comparison is case-insensitive. Hierarchy tests only match at
/// token boundaries, so `TPD PR` is not an ancestor of `TPD PRD`.
#[derive(Debug, Clone, Default)]
pub struct DepartmentPath {
    tokens: Vec<String>,
}

impl DepartmentPath {
    pub fn new(path: &str) -> Self {
        Self {
            tokens: path.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of tokens in the path.
    pub fn depth(&self) -> usize {
        self.tokens.len()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The path with its last token removed.
    ///
    /// Returns `None` for root (single token) and empty paths. A parent is never
    /// equal to the path it was computed from.
    pub fn parent(&self) -> Option<DepartmentPath> {
        if self.tokens.len() < 2 {
            return None;
        }
        Some(Self {
            tokens: self.tokens[..self.tokens.len() - 1].to_vec(),
        })
    }

    /// The first `level` tokens. A level deeper than the path yields the whole path,
    /// level 0 (or an empty path) yields `None`.
    pub fn go_to_level(&self, level: usize) -> Option<DepartmentPath> {
        if level == 0 || self.tokens.is_empty() {
            return None;
        }
        let take = level.min(self.tokens.len());
        Some(Self {
            tokens: self.tokens[..take].to_vec(),
        })
    }

    /// True when `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &DepartmentPath) -> bool {
        if self.tokens.is_empty() || other.tokens.len() <= self.tokens.len() {
            return false;
        }
        self.tokens
            .iter()
            .zip(other.tokens.iter())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    pub fn is_descendant_of(&self, other: &DepartmentPath) -> bool {
        other.is_ancestor_of(self)
    }

    /// Equal to `other`, or `other` lies below this path.
    pub fn contains(&self, other: &DepartmentPath) -> bool {
        self == other || self.is_ancestor_of(other)
    }
}

impl PartialEq for DepartmentPath {
    fn eq(&self, other: &Self) -> bool {
        self.tokens.len() == other.tokens.len()
            && self
                .tokens
                .iter()
                .zip(other.tokens.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for DepartmentPath {}

impl std::hash::Hash for DepartmentPath {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        for token in &self.tokens {
            token.to_ascii_uppercase().hash(state);
        }
    }
}

impl fmt::Display for DepartmentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tokens.join(" "))
    }
}

impl From<&str> for DepartmentPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DepartmentPath {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl Serialize for DepartmentPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DepartmentPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_drops_last_token() {
        let path = DepartmentPath::new("TPD PRD MY TEST DEP1");
        assert_eq!(path.parent().unwrap().to_string(), "TPD PRD MY TEST");
    }

    #[test]
    fn root_and_empty_have_no_parent() {
        assert!(DepartmentPath::new("TPD").parent().is_none());
        assert!(DepartmentPath::new("   ").parent().is_none());
    }

    #[test]
    fn go_to_level_clamps_to_depth() {
        let path = DepartmentPath::new("TPD PRD MY");
        assert_eq!(path.go_to_level(2).unwrap().to_string(), "TPD PRD");
        assert_eq!(path.go_to_level(10).unwrap(), path);
        assert!(path.go_to_level(0).is_none());
    }

    #[test]
    fn ancestor_match_respects_token_boundaries() {
        let prefix = DepartmentPath::new("TPD PR");
        let path = DepartmentPath::new("TPD PRD MY");
        assert!(!prefix.is_ancestor_of(&path));
        assert!(DepartmentPath::new("TPD PRD").is_ancestor_of(&path));
    }

    #[test]
    fn comparisons_ignore_case_and_spacing() {
        let a = DepartmentPath::new("tpd  prd my");
        let b = DepartmentPath::new("TPD PRD MY");
        assert_eq!(a, b);
        assert!(DepartmentPath::new("tpd prd").is_ancestor_of(&b));
    }

    #[test]
    fn path_is_not_its_own_ancestor() {
        let path = DepartmentPath::new("TPD PRD");
        assert!(!path.is_ancestor_of(&path));
        assert!(path.contains(&path));
    }

    #[test]
    fn empty_path_is_ancestor_of_nothing() {
        let empty = DepartmentPath::default();
        assert!(!empty.is_ancestor_of(&DepartmentPath::new("TPD")));
    }
}
