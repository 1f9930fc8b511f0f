//! Loader configuration.
//!
//! Read from a TOML table; every key is optional:
//!
//! ```toml
//! scripts_dir = "scripts"
//! enable_caching = true
//! cache_dir = "cache"        # relative to each script's directory
//! extension = "sk"
//! disabled_prefix = "-"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LoadError;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Root of the directory scan.
    pub scripts_dir: PathBuf,
    #[serde(default = "default_true")]
    pub enable_caching: bool,
    /// Artifact directory, relative to the script's own directory.
    pub cache_dir: PathBuf,
    /// Script file extension, without the dot.
    pub extension: String,
    /// Files and directories whose name starts with this are skipped.
    pub disabled_prefix: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("scripts"),
            enable_caching: true,
            cache_dir: PathBuf::from("cache"),
            extension: "sk".to_owned(),
            disabled_prefix: "-".to_owned(),
        }
    }
}

impl LoaderConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, LoadError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load_file(path: &Path) -> Result<Self, LoadError> {
        let content = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let config = Self::from_toml_str(&content)?;
        info!(target: "script::loader", "loaded loader config from {}", path.display());
        Ok(config)
    }

    /// `true` if `path` has the script extension and is not disabled.
    pub fn is_script(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == self.extension.as_str())
            && !self.is_disabled(path)
    }

    /// `true` if the file or directory name carries the disabled prefix.
    pub fn is_disabled(&self, path: &Path) -> bool {
        !self.disabled_prefix.is_empty()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&self.disabled_prefix))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_table_gives_defaults() {
        assert_eq!(LoaderConfig::from_toml_str("").unwrap(), LoaderConfig::default());
    }

    #[test]
    fn partial_table() {
        let cfg = LoaderConfig::from_toml_str("enable_caching = false\nextension = \"skript\"").unwrap();
        assert!(!cfg.enable_caching);
        assert_eq!(cfg.extension, "skript");
        assert_eq!(cfg.scripts_dir, PathBuf::from("scripts"));
    }

    #[test]
    fn wrong_type_is_a_config_error() {
        let err = LoaderConfig::from_toml_str("enable_caching = \"yes\"").unwrap_err();
        assert!(matches!(err, LoadError::Config(_)));
    }

    #[test]
    fn load_file_reads_toml() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "scripts_dir = \"plugins/sk\"").unwrap();
        let cfg = LoaderConfig::load_file(f.path()).unwrap();
        assert_eq!(cfg.scripts_dir, PathBuf::from("plugins/sk"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = LoaderConfig::load_file(Path::new("/nonexistent/sk.toml")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn script_filter() {
        let cfg = LoaderConfig::default();
        assert!(cfg.is_script(Path::new("scripts/a.sk")));
        assert!(!cfg.is_script(Path::new("scripts/-a.sk")));
        assert!(!cfg.is_script(Path::new("scripts/a.txt")));
        assert!(cfg.is_disabled(Path::new("scripts/-old")));
    }
}
