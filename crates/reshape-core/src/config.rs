//! Configuration parsing and validation
//!
//! This module handles loading and validating Reshape project files.
//!
//! # Configuration Files
//!
//! - `reshape.yaml` - Project root configuration and watched sources
//! - `templates/*.yaml` - Field templates, one per file
//! - `profiles/*.yaml` - Mapping profiles between two templates

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::format::Format;
use crate::mapping::{OnRowError, Profile};
use crate::parsers::ParseOptions;
use crate::schema::{FieldNode, FlatField, flatten_fields};
use crate::watch::WatchedSource;

/// Root project configuration from `reshape.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,

    /// Runtime settings
    #[serde(default)]
    pub settings: Settings,

    /// Remote sources re-converted on change
    #[serde(default)]
    pub watch: Vec<WatchedSource>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Upload, parsing, fetching and scheduling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Seconds between watched-source scans
    #[serde(default = "default_scan_period_seconds")]
    pub scan_period_seconds: u64,

    /// User agent sent on every fetch
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout for fetches
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,

    /// Upload size limit applied when no per-format limit is set
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Per-format upload size limits
    #[serde(default)]
    pub per_format_upload_bytes: HashMap<Format, u64>,

    /// Directory the file executor writes converted output to
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// What a conversion does with rows that fail coercion
    #[serde(default)]
    pub on_row_error: OnRowError,

    /// CSV delimiter and XML record element
    #[serde(flatten)]
    pub parsing: ParseOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_period_seconds: default_scan_period_seconds(),
            user_agent: default_user_agent(),
            request_timeout_seconds: default_request_timeout_seconds(),
            max_upload_bytes: default_max_upload_bytes(),
            per_format_upload_bytes: HashMap::new(),
            output_dir: default_output_dir(),
            on_row_error: OnRowError::default(),
            parsing: ParseOptions::default(),
        }
    }
}

fn default_scan_period_seconds() -> u64 {
    20
}

fn default_user_agent() -> String {
    format!("reshape/{}", env!("CARGO_PKG_VERSION"))
}

fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_output_dir() -> String {
    "output".to_string()
}

impl Settings {
    /// Size limit for uploads of `format`
    pub fn upload_limit(&self, format: Format) -> u64 {
        self.per_format_upload_bytes
            .get(&format)
            .copied()
            .unwrap_or(self.max_upload_bytes)
    }

    /// Reject uploads larger than the applicable limit
    pub fn check_upload_size(&self, format: Format, size: u64) -> Result<()> {
        let limit = self.upload_limit(format);
        if size > limit {
            return Err(Error::UploadTooLarge { format, size, limit });
        }
        Ok(())
    }
}

/// A named field template with its file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Template name
    pub name: String,

    /// File format documents of this template use
    pub format: Format,

    /// Top-level fields
    #[serde(default)]
    pub fields: Vec<FieldNode>,
}

impl Template {
    /// Flattened `(path, kind)` list of this template
    pub fn flat_fields(&self) -> Vec<FlatField> {
        flatten_fields(&self.fields)
    }
}

/// Main configuration container
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Base path of the project
    pub base_path: PathBuf,
}

impl Config {
    /// Load configuration from a directory
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the project directory or reshape.yaml file
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = Config::load("./my-project")?;
    /// println!("Project: {}", config.project.name);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let (config_path, base_path) = if path.is_dir() {
            (path.join("reshape.yaml"), path.to_path_buf())
        } else {
            (
                path.to_path_buf(),
                path.parent().unwrap_or(Path::new(".")).to_path_buf(),
            )
        };

        if !config_path.exists() {
            return Err(Error::ConfigNotFound {
                path: config_path.display().to_string(),
            });
        }

        let contents = std::fs::read_to_string(&config_path)?;
        let project: ProjectConfig = serde_yaml::from_str(&contents)?;

        if project.settings.scan_period_seconds == 0 {
            return Err(Error::ConfigInvalid {
                message: "settings.scan_period_seconds must be greater than zero".to_string(),
            });
        }

        Ok(Self { project, base_path })
    }

    /// Project settings
    pub fn settings(&self) -> &Settings {
        &self.project.settings
    }

    /// Load all templates from `templates/*.yaml`
    pub fn load_templates(&self) -> Result<Vec<Template>> {
        self.load_dir("templates")
    }

    /// Load all profiles from `profiles/*.yaml`, checking each for duplicate targets
    pub fn load_profiles(&self) -> Result<Vec<Profile>> {
        let profiles: Vec<Profile> = self.load_dir("profiles")?;
        for profile in &profiles {
            profile.validate()?;
        }
        Ok(profiles)
    }

    /// Find a template by name
    pub fn template(&self, name: &str) -> Result<Template> {
        self.load_templates()?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::ConfigInvalid {
                message: format!("template '{}' not found", name),
            })
    }

    /// Find a profile by name
    pub fn profile(&self, name: &str) -> Result<Profile> {
        self.load_profiles()?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::ConfigInvalid {
                message: format!("profile '{}' not found", name),
            })
    }

    /// Output format of a profile: the format of its target template
    pub fn output_format(&self, profile: &Profile) -> Result<Option<Format>> {
        match &profile.target_template {
            Some(name) => Ok(Some(self.template(name)?.format)),
            None => Ok(None),
        }
    }

    /// Resolve a path relative to the project directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    fn load_dir<T: serde::de::DeserializeOwned>(&self, dir: &str) -> Result<Vec<T>> {
        let dir = self.base_path.join(dir);
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut entries: Vec<_> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        entries.sort_by_key(|e| e.path());

        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let contents = std::fs::read_to_string(entry.path())?;
            items.push(serde_yaml::from_str(&contents)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldKind;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
name: test-project
"#;
        let config: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.name, "test-project");
        assert_eq!(config.version, "0.1.0");
        assert_eq!(config.settings.scan_period_seconds, 20);
        assert_eq!(config.settings.request_timeout_seconds, 60);
        assert_eq!(config.settings.parsing.csv_delimiter, ',');
        assert_eq!(config.settings.parsing.xml_record_element, "record");
        assert_eq!(config.settings.output_dir, "output");
        assert!(config.watch.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
name: test-project
version: "1.0.0"
settings:
  scan_period_seconds: 5
  user_agent: test-agent/1.0
  max_upload_bytes: 1000
  per_format_upload_bytes:
    excel: 5000
  csv_delimiter: ";"
  xml_record_element: item
  on_row_error: log_and_skip
watch:
  - url: http://example.com/data.csv
    intervalMinutes: 15
    mappingTemplateId: people
"#;
        let config: ProjectConfig = serde_yaml::from_str(yaml).unwrap();
        let settings = &config.settings;
        assert_eq!(settings.scan_period_seconds, 5);
        assert_eq!(settings.user_agent, "test-agent/1.0");
        assert_eq!(settings.parsing.csv_delimiter, ';');
        assert_eq!(settings.parsing.xml_record_element, "item");
        assert_eq!(settings.on_row_error, OnRowError::LogAndSkip);
        assert_eq!(config.watch.len(), 1);
        assert_eq!(config.watch[0].interval_minutes, 15);
    }

    #[test]
    fn test_upload_limits() {
        let mut settings = Settings {
            max_upload_bytes: 1000,
            ..Settings::default()
        };
        settings.per_format_upload_bytes.insert(Format::Excel, 5000);

        assert!(settings.check_upload_size(Format::Csv, 1000).is_ok());
        assert!(matches!(
            settings.check_upload_size(Format::Csv, 1001),
            Err(Error::UploadTooLarge { limit: 1000, .. })
        ));
        assert!(settings.check_upload_size(Format::Excel, 4000).is_ok());
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("templates")).unwrap();
        std::fs::create_dir_all(dir.path().join("profiles")).unwrap();
        std::fs::write(dir.path().join("reshape.yaml"), "name: test\n").unwrap();
        dir
    }

    #[test]
    fn test_load_templates_and_profiles() {
        let dir = project();
        std::fs::write(
            dir.path().join("templates/people-json.yaml"),
            "name: people-json\nformat: json\nfields:\n  - name: FullName\n    kind: String\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("profiles/people.yaml"),
            "name: people\ntarget_template: people-json\nrules:\n  - source: Name\n    target: FullName\n    kind: String\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("profiles/README.md"), "ignored").unwrap();

        let config = Config::load(dir.path()).unwrap();
        let template = config.template("people-json").unwrap();
        assert_eq!(template.flat_fields(), vec![FlatField::new("FullName", FieldKind::String)]);

        let profile = config.profile("people").unwrap();
        assert_eq!(config.output_format(&profile).unwrap(), Some(Format::Json));
        assert!(config.profile("missing").is_err());
    }

    #[test]
    fn test_duplicate_targets_rejected_on_load() {
        let dir = project();
        std::fs::write(
            dir.path().join("profiles/dup.yaml"),
            "name: dup\nrules:\n  - {source: a, target: x, kind: String}\n  - {source: b, target: x, kind: String}\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert!(matches!(config.load_profiles(), Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(Error::ConfigNotFound { .. })
        ));
    }

    #[test]
    fn test_zero_scan_period_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("reshape.yaml"),
            "name: test\nsettings:\n  scan_period_seconds: 0\n",
        )
        .unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(Error::ConfigInvalid { .. })
        ));
    }
}
