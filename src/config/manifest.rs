//! Fetch manifest: the list of resources a fetch job downloads.
//!
//! ```toml
//! identifiers = ["https://example.org/a.jpg", "https://example.org/b.jpg"]
//! placeholder = "assets/missing.png"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Images fetched by the demo screen.
pub const DEFAULT_IDENTIFIERS: [&str; 11] = [
    "https://cdn.spacetelescope.org/archives/images/publicationjpg/heic1509a.jpg",
    "https://cdn.spacetelescope.org/archives/images/publicationjpg/heic1501a.jpg",
    "https://cdn.spacetelescope.org/archives/images/publicationjpg/heic1107a.jpg",
    "https://cdn.spacetelescope.org/archives/images/large/heic0715a.jpg",
    "https://cdn.spacetelescope.org/archives/images/publicationjpg/heic1608a.jpg",
    "https://cdn.spacetelescope.org/archives/images/publicationjpg/potw1345a.jpg",
    "https://cdn.spacetelescope.org/archives/images/large/heic1307a.jpg",
    "https://cdn.spacetelescope.org/archives/images/publicationjpg/heic0817a.jpg",
    "https://cdn.spacetelescope.org/archives/images/publicationjpg/opo0328a.jpg",
    "https://cdn.spacetelescope.org/archives/images/publicationjpg/heic0506a.jpg",
    "https://cdn.spacetelescope.org/archives/images/large/heic0503a.jpg",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchManifest {
    pub identifiers: Vec<String>,
    /// File rendered in place of payloads that failed to fetch.
    #[serde(default)]
    pub placeholder: Option<PathBuf>,
}

impl Default for FetchManifest {
    fn default() -> Self {
        Self {
            identifiers: DEFAULT_IDENTIFIERS.iter().map(|s| s.to_string()).collect(),
            placeholder: None,
        }
    }
}

impl FetchManifest {
    /// Load a manifest from a TOML file. A relative placeholder path is
    /// resolved against the manifest's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Manifest {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut manifest = Self::parse(&content, &path.display().to_string())?;
        let resolved = match (&manifest.placeholder, path.parent()) {
            (Some(placeholder), Some(dir)) if placeholder.is_relative() => {
                Some(dir.join(placeholder))
            }
            _ => None,
        };
        if resolved.is_some() {
            manifest.placeholder = resolved;
        }
        Ok(manifest)
    }

    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Manifest {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Read the placeholder file, if one is configured.
    pub fn placeholder_bytes(&self) -> Result<Option<Vec<u8>>> {
        match &self.placeholder {
            Some(path) => Ok(Some(std::fs::read(path)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_manifest_lists_demo_images() {
        let manifest = FetchManifest::default();
        assert_eq!(manifest.identifiers.len(), 11);
        assert!(manifest.placeholder.is_none());
    }

    #[test]
    fn parse_reads_identifiers_in_order() {
        let manifest = FetchManifest::parse(
            r#"
identifiers = ["b", "a", "c"]
placeholder = "missing.png"
"#,
            "inline",
        )
        .unwrap();
        assert_eq!(manifest.identifiers, vec!["b", "a", "c"]);
        assert_eq!(manifest.placeholder, Some(PathBuf::from("missing.png")));
    }

    #[test]
    fn parse_rejects_missing_identifiers() {
        let err = FetchManifest::parse("placeholder = \"x\"", "inline").unwrap_err();
        assert!(matches!(err, Error::Manifest { .. }));
    }

    #[test]
    fn empty_identifier_list_is_allowed() {
        let manifest = FetchManifest::parse("identifiers = []", "inline").unwrap();
        assert!(manifest.identifiers.is_empty());
    }
}
