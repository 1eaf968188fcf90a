use std::collections::BTreeSet;
use std::fmt;

use portal_core::ScriptResource;

use crate::error::ResourceError;

/// Where a script's code comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptSource {
    Uri(String),
    Inline(String),
}

/// A validated script descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptDescriptor {
    pub source: ScriptSource,
    pub provides: BTreeSet<String>,
    pub requires: BTreeSet<String>,
}

impl ScriptDescriptor {
    pub fn uri(uri: impl Into<String>) -> Self {
        Self {
            source: ScriptSource::Uri(uri.into()),
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
        }
    }

    pub fn inline(source: impl Into<String>) -> Self {
        Self {
            source: ScriptSource::Inline(source.into()),
            provides: BTreeSet::new(),
            requires: BTreeSet::new(),
        }
    }

    pub fn providing<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn requiring<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires.extend(names.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for ScriptDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            ScriptSource::Uri(uri) => f.write_str(uri),
            ScriptSource::Inline(source) => {
                let head: String = source.chars().take(32).collect();
                write!(f, "inline script `{head}`")
            }
        }
    }
}

impl TryFrom<ScriptResource> for ScriptDescriptor {
    type Error = ResourceError;

    fn try_from(resource: ScriptResource) -> Result<Self, Self::Error> {
        let source = match (resource.uri, resource.source) {
            (Some(uri), None) => ScriptSource::Uri(uri),
            (None, Some(source)) => ScriptSource::Inline(source),
            (Some(uri), Some(_)) => return Err(ResourceError::AmbiguousSource { uri }),
            (None, None) => return Err(ResourceError::MissingSource),
        };
        Ok(Self {
            source,
            provides: resource.provides.into_iter().collect(),
            requires: resource.requires.into_iter().collect(),
        })
    }
}
