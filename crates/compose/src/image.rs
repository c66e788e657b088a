//! Image references and on-demand pulls.
//!
//! Images are only ever pulled lazily: when a create call reports that the
//! image is missing, or when a caller asks for it explicitly. An untagged
//! reference is pulled as `:latest`, and credentials are looked up by the
//! registry index the repository resolves to.

use std::fmt;

use metrics::counter;
use tracing::{error, info};

use stevedore_core::metrics as m;

use crate::auth::CredentialStore;
use crate::docker::RuntimeClient;
use crate::error::ComposeError;

/// Tag substituted when a reference carries neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

/// Index name of the public Docker Hub registry.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Server address Docker clients use as the credential key for Docker Hub.
pub const DEFAULT_INDEX_SERVER: &str = "https://index.docker.io/v1/";

/// A parsed `[registry/]repository[:tag][@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// Parses an image reference.
    ///
    /// The leading path component is treated as a registry host when it
    /// contains a `.` or `:` or is `localhost`, which matches how the Docker
    /// CLI splits references.
    ///
    /// # Errors
    ///
    /// Returns `ComposeError::InvalidReference` for empty references, empty
    /// tags or digests, and references containing whitespace.
    pub fn parse(reference: &str) -> Result<Self, ComposeError> {
        let invalid = |reason: &str| ComposeError::InvalidReference {
            reference: reference.to_owned(),
            reason: reason.to_owned(),
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("reference is empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(invalid("reference contains whitespace"));
        }

        let (name, digest) = match trimmed.split_once('@') {
            Some((_, "")) => return Err(invalid("digest is empty")),
            Some((name, digest)) => (name, Some(digest.to_owned())),
            None => (trimmed, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones belong to a registry port.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (remote, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = &name[split + 1..];
                if tag.is_empty() {
                    return Err(invalid("tag is empty"));
                }
                (&name[..split], Some(tag.to_owned()))
            }
            None => (name, None),
        };

        let (registry, repository) = match remote.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => (Some(first.to_owned()), rest),
            _ => (None, remote),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("repository is empty"));
        }

        Ok(Self {
            registry,
            repository: repository.to_owned(),
            tag,
            digest,
        })
    }

    /// Returns the reference with [`DEFAULT_TAG`] filled in when it has no tag and no digest.
    pub fn with_default_tag(mut self) -> Self {
        if self.tag.is_none() && self.digest.is_none() {
            self.tag = Some(DEFAULT_TAG.to_owned());
        }
        self
    }

    /// The tagless remote name, including the registry host when present.
    pub fn name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{registry}/{}", self.repository),
            None => self.repository.clone(),
        }
    }

    /// Repository path without the registry host.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Explicit registry host, if any.
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Registry index the repository belongs to (`docker.io` when no host is given).
    pub fn index_name(&self) -> &str {
        self.registry.as_deref().unwrap_or(DEFAULT_REGISTRY)
    }

    /// Whether the repository lives on the default public index.
    pub fn is_default_index(&self) -> bool {
        matches!(
            self.index_name(),
            DEFAULT_REGISTRY | "index.docker.io" | "registry-1.docker.io"
        )
    }

    /// Server address to send along with credentials.
    pub fn index_server(&self) -> String {
        if self.is_default_index() {
            DEFAULT_INDEX_SERVER.to_owned()
        } else {
            self.index_name().to_owned()
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

/// Pulls `image` through `client`, attaching a credential when one matches its index.
///
/// There is no retry loop: failures are logged and returned as
/// `ComposeError::ImagePull`.
pub async fn pull<C: RuntimeClient>(
    client: &C,
    credentials: &CredentialStore,
    image: &str,
) -> Result<(), ComposeError> {
    let reference = ImageReference::parse(image)?.with_default_tag();
    let credential = credentials.resolve(&reference);

    info!(
        image = %reference,
        registry = reference.index_name(),
        authenticated = credential.is_some(),
        "pulling image"
    );

    match client.pull_image(&reference, credential).await {
        Ok(()) => {
            counter!(m::IMAGE_PULLS_TOTAL, m::LABEL_RESULT => "success").increment(1);
            info!(image = %reference, "image pulled");
            Ok(())
        }
        Err(e) => {
            counter!(m::IMAGE_PULLS_TOTAL, m::LABEL_RESULT => "failure").increment(1);
            error!(image = %reference, error = %e, "failed to pull image");
            Err(ComposeError::ImagePull {
                image: reference.to_string(),
                reason: e.to_string(),
            })
        }
    }
}
