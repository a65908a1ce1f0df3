/// Container image reference parsing
///
/// Handles `[host[:port]/][namespace/]name[:tag][@digest]`.

use anyhow::{bail, Result};
use std::fmt;

pub const DEFAULT_REGISTRY_HOST: &str = "docker.io";
pub const DEFAULT_TAG: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub host: String,
    /// Everything between host and name, possibly several segments
    pub namespace: Option<String>,
    pub name: String,
    pub tag: String,
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() || reference.contains(char::is_whitespace) {
            bail!("invalid image reference '{}'", reference);
        }

        let (remainder, digest) = match reference.split_once('@') {
            Some((rest, digest)) if !digest.is_empty() => (rest, Some(digest.to_string())),
            Some(_) => bail!("invalid image reference '{}': empty digest", reference),
            None => (reference, None),
        };

        let mut segments: Vec<&str> = remainder.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            bail!("invalid image reference '{}': empty path segment", reference);
        }

        let host = if segments.len() > 1 && looks_like_host(segments[0]) {
            segments.remove(0).to_string()
        } else {
            DEFAULT_REGISTRY_HOST.to_string()
        };

        let last = segments.pop().unwrap_or_default();
        let (name, tag) = match last.split_once(':') {
            Some((name, tag)) if !tag.is_empty() => (name, tag),
            Some(_) => bail!("invalid image reference '{}': empty tag", reference),
            None => (last, DEFAULT_TAG),
        };
        if name.is_empty() {
            bail!("invalid image reference '{}': empty name", reference);
        }

        let namespace = if segments.is_empty() {
            None
        } else {
            Some(segments.join("/"))
        };

        Ok(Self {
            host,
            namespace,
            name: name.to_string(),
            tag: tag.to_string(),
            digest,
        })
    }

    /// Reference without tag or digest
    pub fn repository(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", self.host, ns, self.name),
            None => format!("{}/{}", self.host, self.name),
        }
    }

    /// Copy of this reference pushed under the backup hub and namespace.
    ///
    /// The tag records both the build version and the backup version so
    /// backups of the same build from different group versions never collide.
    pub fn backup_reference(
        &self,
        hub_url: &str,
        namespace: &str,
        build_version: &str,
        backup_version: &str,
    ) -> Self {
        let host = hub_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        let namespace = if namespace.is_empty() {
            self.namespace.clone()
        } else {
            Some(namespace.to_string())
        };

        Self {
            host: host.to_string(),
            namespace,
            name: self.name.clone(),
            tag: format!("{}_{}_backup", build_version, backup_version),
            digest: None,
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository(), self.tag)?;
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

fn looks_like_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}
