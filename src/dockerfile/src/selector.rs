//! Reference selectors.

use a3s_dockerfile_core::error::Result;

use crate::reference::ImageReference;

/// Decides whether a reference found in a Dockerfile should be rewritten.
pub trait Selector {
    fn matches(&self, reference: &ImageReference) -> bool;
}

impl<F> Selector for F
where
    F: Fn(&ImageReference) -> bool,
{
    fn matches(&self, reference: &ImageReference) -> bool {
        self(reference)
    }
}

/// Matches references by repository, optionally also by tag and digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefSelector {
    reference: ImageReference,
    exact: bool,
}

impl RefSelector {
    /// Match any tag or digest of the same repository.
    pub fn name(reference: ImageReference) -> Self {
        Self {
            reference,
            exact: false,
        }
    }

    /// Match only the identical reference, tag and digest included.
    pub fn exact(reference: ImageReference) -> Self {
        Self {
            reference,
            exact: true,
        }
    }

    /// Parse `s` and build a repository selector.
    pub fn parse_name(s: &str) -> Result<Self> {
        Ok(Self::name(ImageReference::parse_named(s)?))
    }

    pub fn reference(&self) -> &ImageReference {
        &self.reference
    }
}

impl Selector for RefSelector {
    fn matches(&self, reference: &ImageReference) -> bool {
        if self.exact {
            return self.reference == *reference;
        }
        self.reference.registry == reference.registry
            && self.reference.repository == reference.repository
    }
}

impl std::fmt::Display for RefSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.exact {
            write!(f, "{}", self.reference.familiar_string())
        } else {
            write!(f, "{}", self.reference.familiar_name())
        }
    }
}
