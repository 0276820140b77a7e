use std::fmt;

static DOCKER_TRANSPORT: &str = "docker://";

/// A repository to mirror, as listed in the manifest, e.g. `registry.k8s.io/coredns/coredns`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReference(String);

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    Empty,
    DigestNotAllowed(String),
    TagNotAllowed(String),
    InvalidFormat(String),
}

impl std::error::Error for ParseError {}
impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Empty => write!(f, "reference is empty"),
            ParseError::DigestNotAllowed(reference) => {
                write!(f, "digest references are not allowed: {}", reference)
            }
            ParseError::TagNotAllowed(reference) => write!(
                f,
                "reference must name a repository, not a tag: {}",
                reference
            ),
            ParseError::InvalidFormat(reference) => {
                write!(f, "invalid reference format: {}", reference)
            }
        }
    }
}

impl fmt::Display for SourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl SourceReference {
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let trimmed = s.trim();
        let reference = trimmed
            .strip_prefix(DOCKER_TRANSPORT)
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        if reference.is_empty() {
            return Err(ParseError::Empty);
        }
        if reference.contains(char::is_whitespace) || reference.starts_with('/') {
            return Err(ParseError::InvalidFormat(reference.to_string()));
        }
        // list-tags only accepts a bare repository
        if reference.contains('@') {
            return Err(ParseError::DigestNotAllowed(reference.to_string()));
        }
        if let Some(pos) = reference.rfind(':') {
            // a colon before the last slash is a registry port
            let last_slash = reference.rfind('/').unwrap_or(0);
            if pos > last_slash {
                return Err(ParseError::TagNotAllowed(reference.to_string()));
            }
        }

        Ok(Self(reference.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn slash_count(&self) -> usize {
        self.0.matches('/').count()
    }

    /// The first path segment, which is the registry host for `host/...` references.
    pub fn host(&self) -> &str {
        self.0.split('/').next().unwrap_or(self.0.as_str())
    }

    /// Everything after the host, or the whole reference when it has no slash.
    pub fn path(&self) -> &str {
        self.0.split_once('/').map_or(self.0.as_str(), |(_, path)| path)
    }

    pub fn last_segment(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(self.0.as_str())
    }
}
