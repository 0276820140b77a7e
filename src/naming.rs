use crate::source_reference::SourceReference;
use serde::Deserialize;

/// How a matched `host/org/name` reference becomes a single path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transform {
    /// `host/org-x/my-app` becomes `org_x_my_app`
    Flatten,
    /// `host/org/name` becomes `name`
    LastSegment,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamingRule {
    pub host: String,
    /// Only match references containing this substring
    #[serde(default)]
    pub contains: Option<String>,
    pub transform: Transform,
}

impl NamingRule {
    fn new(host: &str, contains: Option<&str>, transform: Transform) -> Self {
        Self {
            host: host.to_string(),
            contains: contains.map(str::to_string),
            transform,
        }
    }

    fn matches(&self, reference: &SourceReference) -> bool {
        self.host == reference.host()
            && self
                .contains
                .as_deref()
                .is_none_or(|needle| reference.as_str().contains(needle))
    }
}

/// Ordered host rules for `host/org/name` references; the first matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamingRules {
    pub rules: Vec<NamingRule>,
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            rules: vec![
                // coredns keeps its plain name on the destination
                NamingRule::new("registry.k8s.io", Some("coredns"), Transform::LastSegment),
                NamingRule::new("registry.k8s.io", None, Transform::Flatten),
                NamingRule::new("quay.io", None, Transform::Flatten),
                NamingRule::new("gcr.io", None, Transform::Flatten),
                NamingRule::new("docker.io", None, Transform::Flatten),
            ],
        }
    }
}

impl NamingRules {
    /// Maps a source repository to the name it is stored under in the destination namespace.
    ///
    /// Only references with exactly two slashes consult the rules. Every other
    /// shape, and any unmatched host, keeps the final path segment.
    pub fn destination_name(&self, reference: &SourceReference) -> String {
        if reference.slash_count() != 2 {
            return reference.last_segment().to_string();
        }

        let transform = self
            .rules
            .iter()
            .find(|rule| rule.matches(reference))
            .map(|rule| rule.transform)
            .unwrap_or(Transform::LastSegment);

        match transform {
            Transform::Flatten => reference.path().replace('-', "_").replace('/', "_"),
            Transform::LastSegment => reference.last_segment().to_string(),
        }
    }
}
