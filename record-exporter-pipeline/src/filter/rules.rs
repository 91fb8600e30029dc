//! Variable name inclusion and exclusion rules.

/// A literal, case sensitive match on a variable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRule {
    Exact(String),
    StartsWith(String),
    EndsWith(String),
}

impl NameRule {
    /// Parse a rule: `abc*` matches by prefix, `*abc` by suffix, anything
    /// else exactly. Surrounding whitespace is ignored; blank rules yield
    /// `None`.
    pub fn parse(rule: &str) -> Option<Self> {
        let rule = rule.trim();
        if rule.is_empty() {
            return None;
        }

        if let Some(prefix) = rule.strip_suffix('*') {
            Some(NameRule::StartsWith(prefix.to_string()))
        } else if let Some(suffix) = rule.strip_prefix('*') {
            Some(NameRule::EndsWith(suffix.to_string()))
        } else {
            Some(NameRule::Exact(rule.to_string()))
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameRule::Exact(exact) => name == exact,
            NameRule::StartsWith(prefix) => name.starts_with(prefix.as_str()),
            NameRule::EndsWith(suffix) => name.ends_with(suffix.as_str()),
        }
    }
}

/// Parse a list of rule strings, dropping blank entries.
pub fn parse_rules<I, S>(rules: I) -> Vec<NameRule>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    rules
        .into_iter()
        .filter_map(|rule| NameRule::parse(rule.as_ref()))
        .collect()
}

/// Inclusion rules OR'ed together, then exclusion rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableNameRules {
    inclusion: Vec<NameRule>,
    exclusion: Vec<NameRule>,
}

impl VariableNameRules {
    pub fn new(inclusion: Vec<NameRule>, exclusion: Vec<NameRule>) -> Self {
        Self {
            inclusion,
            exclusion,
        }
    }

    /// A name passes when no inclusion rule is configured or any matches,
    /// and no exclusion rule matches.
    pub fn accepts(&self, name: &str) -> bool {
        let included =
            self.inclusion.is_empty() || self.inclusion.iter().any(|rule| rule.matches(name));
        included && !self.exclusion.iter().any(|rule| rule.matches(name))
    }

    pub fn is_empty(&self) -> bool {
        self.inclusion.is_empty() && self.exclusion.is_empty()
    }
}
