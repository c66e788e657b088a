//! Registry credential store.
//!
//! Reads the `auths` section of a Docker client `config.json` and resolves a
//! credential for an image by its registry index. Keys are normalised to bare
//! hostnames so `https://index.docker.io/v1/`, `index.docker.io` and
//! `docker.io` all resolve to the same entry.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ComposeError;
use crate::image::{DEFAULT_REGISTRY, ImageReference};

/// Username/password pair attached to a pull request.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredential {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    /// Server address as written in the credential file.
    pub server_address: String,
}

// Keep the password out of debug output.
impl std::fmt::Debug for RegistryCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .field("server_address", &self.server_address)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, AuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Credentials keyed by normalised registry hostname.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    entries: BTreeMap<String, RegistryCredential>,
}

impl CredentialStore {
    /// Default location of the Docker client config: `$DOCKER_CONFIG/config.json`,
    /// falling back to `~/.docker/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var("DOCKER_CONFIG") {
            return Some(PathBuf::from(dir).join("config.json"));
        }
        dirs::home_dir().map(|home| home.join(".docker").join("config.json"))
    }

    /// Loads the store from `path`. A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns `ComposeError::Credentials` when the file exists but cannot be
    /// read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ComposeError> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no credential file, pulls will be anonymous");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ComposeError::Credentials {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        Self::parse(&content, &path.display().to_string())
    }

    /// Parses a `config.json` document. `source` is only used in error messages.
    pub fn parse(json: &str, source: &str) -> Result<Self, ComposeError> {
        let file: DockerConfigFile =
            serde_json::from_str(json).map_err(|e| ComposeError::Credentials {
                path: source.to_owned(),
                reason: e.to_string(),
            })?;

        let mut store = Self::default();
        for (server, entry) in file.auths {
            match decode_entry(&server, entry) {
                Ok(Some(credential)) => {
                    store.entries.insert(normalize_server(&server), credential);
                }
                // Entries managed by a credential helper carry no secret here.
                Ok(None) => debug!(server = %server, "credential entry has no secret, skipping"),
                Err(reason) => warn!(server = %server, reason = %reason, "ignoring malformed credential entry"),
            }
        }

        debug!(source, entries = store.entries.len(), "credential store loaded");
        Ok(store)
    }

    /// Adds a username/password credential for `server`.
    pub fn insert_basic(&mut self, server: &str, username: &str, password: &str) {
        self.entries.insert(
            normalize_server(server),
            RegistryCredential {
                username: username.to_owned(),
                password: password.to_owned(),
                email: None,
                server_address: server.to_owned(),
            },
        );
    }

    /// Looks up the credential for the index `image` resolves to.
    pub fn resolve(&self, image: &ImageReference) -> Option<&RegistryCredential> {
        self.entries.get(&normalize_server(image.index_name()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn decode_entry(server: &str, entry: AuthEntry) -> Result<Option<RegistryCredential>, String> {
    let (username, password) = match (entry.auth.as_deref(), entry.username, entry.password) {
        (Some(encoded), _, _) if !encoded.is_empty() => {
            let decoded = STANDARD
                .decode(encoded)
                .map_err(|e| format!("auth is not valid base64: {e}"))?;
            let decoded =
                String::from_utf8(decoded).map_err(|_| "auth is not valid utf-8".to_owned())?;
            let (user, pass) = decoded
                .split_once(':')
                .ok_or_else(|| "auth must be 'username:password'".to_owned())?;
            (user.to_owned(), pass.to_owned())
        }
        (_, Some(user), Some(pass)) => (user, pass),
        _ => return Ok(None),
    };

    Ok(Some(RegistryCredential {
        username,
        password,
        email: entry.email,
        server_address: server.to_owned(),
    }))
}

/// Reduces a server address to its hostname, folding Docker Hub aliases together.
fn normalize_server(server: &str) -> String {
    let stripped = server
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = stripped.split('/').next().unwrap_or(stripped);
    match host {
        "index.docker.io" | "registry-1.docker.io" | DEFAULT_REGISTRY => {
            DEFAULT_REGISTRY.to_owned()
        }
        other => other.to_owned(),
    }
}
