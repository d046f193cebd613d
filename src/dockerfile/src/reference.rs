//! Image reference parsing.
//!
//! Parses references like `ghcr.io/a3s-box/code:v0.1.0` into structured
//! components, normalized the way Docker does it (`nginx` means
//! `docker.io/library/nginx`), and renders them back in the short
//! "familiar" form used in Dockerfiles. Grammar and normalization come from
//! `oci_distribution::Reference`.

use std::str::FromStr;

use a3s_dockerfile_core::error::{DockerfileError, Result};
use oci_distribution::Reference;

/// Registry used when none is specified.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Namespace of official Docker Hub images.
const OFFICIAL_REPO_PREFIX: &str = "library/";

/// Parsed, normalized image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Registry hostname, optionally with port (e.g., "ghcr.io", "docker.io")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "a3s-box/code")
    pub repository: String,
    /// Tag (e.g., "latest", "v0.1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse and normalize a reference string. No default tag is added.
    ///
    /// - `nginx` → docker.io/library/nginx
    /// - `nginx:1.25` → docker.io/library/nginx:1.25
    /// - `myuser/myimage` → docker.io/myuser/myimage
    /// - `ghcr.io/org/image:tag` → ghcr.io/org/image:tag
    /// - `ghcr.io/org/image@sha256:abc...` → ghcr.io/org/image@sha256:abc...
    pub fn parse_named(reference: &str) -> Result<Self> {
        if is_identifier(reference) {
            return Err(invalid(format!(
                "invalid repository name ({}), cannot specify 64-byte hexadecimal strings",
                reference
            )));
        }

        let parsed = reference
            .parse::<Reference>()
            .map_err(|e| invalid(format!("'{}': {}", reference, e)))?;

        // oci_distribution fills in `latest` when neither tag nor digest is given
        let tag = if has_explicit_tag(reference) {
            parsed.tag().map(str::to_string)
        } else {
            None
        };

        Ok(ImageReference {
            registry: parsed.registry().to_string(),
            repository: parsed.repository().to_string(),
            tag,
            digest: parsed.digest().map(str::to_string),
        })
    }

    /// Fully qualified name without tag or digest.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// Name as a user would write it (`nginx`, `myuser/app`, `ghcr.io/org/app`).
    pub fn familiar_name(&self) -> String {
        if self.registry != DEFAULT_REGISTRY {
            return self.name();
        }
        match self.repository.strip_prefix(OFFICIAL_REPO_PREFIX) {
            Some(short) if !short.contains('/') => short.to_string(),
            _ => self.repository.clone(),
        }
    }

    /// Short form including tag and digest, e.g. `nginx:1.25`.
    pub fn familiar_string(&self) -> String {
        let mut s = self.familiar_name();
        push_tag_digest(&mut s, self.tag.as_deref(), self.digest.as_deref());
        s
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = self.name();
        push_tag_digest(&mut s, self.tag.as_deref(), self.digest.as_deref());
        s
    }

    /// Same repository with a different tag.
    pub fn with_tag(&self, tag: &str) -> Result<Self> {
        let mut s = self.name();
        push_tag_digest(&mut s, Some(tag), self.digest.as_deref());
        Self::parse_named(&s)
    }

    /// Same repository and tag, pinned to `digest`.
    pub fn with_digest(&self, digest: &str) -> Result<Self> {
        let mut s = self.name();
        push_tag_digest(&mut s, self.tag.as_deref(), Some(digest));
        Self::parse_named(&s)
    }
}

impl FromStr for ImageReference {
    type Err = DockerfileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_named(s)
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

fn invalid(message: impl Into<String>) -> DockerfileError {
    DockerfileError::Reference(message.into())
}

fn push_tag_digest(s: &mut String, tag: Option<&str>, digest: Option<&str>) {
    if let Some(tag) = tag {
        s.push(':');
        s.push_str(tag);
    }
    if let Some(digest) = digest {
        s.push('@');
        s.push_str(digest);
    }
}

/// Whether the last path component, digest aside, carries `:tag`.
fn has_explicit_tag(reference: &str) -> bool {
    let name_tag = reference.split_once('@').map_or(reference, |(n, _)| n);
    name_tag
        .rsplit('/')
        .next()
        .is_some_and(|last| last.contains(':'))
}

/// 64 lowercase hex characters: an image ID, not a name.
fn is_identifier(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}
