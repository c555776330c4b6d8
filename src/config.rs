//! Engine configuration and source-file filtering.
//!
//! Configuration is read from TOML and controls the default classification
//! strategy, whether moves inside a bucket run in parallel, and which files in
//! the source folder are left alone. Filtering supports:
//! - Exact filename matching
//! - Glob pattern matching
//! - File extension matching
//! - Regex pattern matching
//! - Include (whitelist) rules that override exclude rules
//!
//! # Configuration File Format
//!
//! ```toml
//! [organize]
//! strategy = "by-date"      # or "by-file-type"
//! parallel = false
//!
//! [filters]
//! enable_hidden_files = false
//!
//! [filters.exclude]
//! filenames = ["Thumbs.db", "desktop.ini"]
//! patterns = ["*.tmp"]
//! extensions = ["part", "crdownload"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::classifier::ClassificationStrategy;

/// Name of the per-directory configuration file.
pub const LOCAL_CONFIG_FILE: &str = ".photo-organizer.toml";

/// Errors that can occur during configuration loading and filter compilation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Invalid glob pattern '{0}'")]
    InvalidGlobPattern(String),

    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },

    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Top-level configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub organize: OrganizeSettings,

    #[serde(default)]
    pub filters: FilterRules,
}

/// Defaults for organize runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizeSettings {
    /// Strategy used when the caller does not pick one.
    #[serde(default)]
    pub strategy: ClassificationStrategy,

    /// Move files within one bucket in parallel.
    #[serde(default)]
    pub parallel: bool,
}

/// Root-level filter rules configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether hidden files (starting with ".") are organized too. Defaults to false.
    #[serde(default)]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Rules for including files (whitelist, overrides exclude rules).
    #[serde(default)]
    pub include: IncludeRules,
}

/// Rules for leaving files in the source folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    /// Exact filenames to exclude (e.g., "Thumbs.db").
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Glob patterns to exclude (e.g., "*.tmp").
    #[serde(default)]
    pub patterns: Vec<String>,

    /// File extensions to exclude, case-insensitive (e.g., "part").
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Regex patterns matched against the file name.
    #[serde(default)]
    pub regex: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    /// Glob patterns that override exclude rules.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl EngineConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `.photo-organizer.toml` in the current directory
    /// 3. Look for `~/.config/photo-organizer/config.toml`
    /// 4. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any discovered file is not valid TOML.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("photo-organizer")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        tracing::debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }
}

impl FilterRules {
    /// Compile rules into matchers.
    ///
    /// # Errors
    ///
    /// Returns an error if any regex or glob patterns are invalid.
    pub fn compile(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(self)
    }
}

/// Pre-compiled filter rules.
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns: compile_globs(&rules.exclude.patterns)?,
            exclude_regexes,
            include_patterns: compile_globs(&rules.include.patterns)?,
        })
    }

    /// Check if a file should be organized.
    ///
    /// `file_path` is matched relative to the source folder. Checks run in
    /// this order, with early termination:
    /// 1. Include patterns (whitelist) - if matched, always include
    /// 2. Hidden file filter - if hidden and disabled, exclude
    /// 3. Exact filename match - if matched, exclude
    /// 4. File extension match - if matched, exclude
    /// 5. Glob pattern match - if matched, exclude
    /// 6. Regex pattern match - if matched, exclude
    /// 7. Default: include
    pub fn should_include(&self, file_path: &Path) -> bool {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self
            .include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = file_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(file_path))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(exclude: ExcludeRules) -> FilterRules {
        FilterRules {
            enable_hidden_files: true,
            exclude,
            include: IncludeRules::default(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(!config.filters.enable_hidden_files);
        assert!(!config.organize.parallel);
        assert_eq!(config.organize.strategy, ClassificationStrategy::ByDate);
    }

    #[test]
    fn test_parse_full_config() {
        let config = EngineConfig::from_toml(
            r#"
            [organize]
            strategy = "by-file-type"
            parallel = true

            [filters]
            enable_hidden_files = true

            [filters.exclude]
            filenames = ["Thumbs.db"]
            extensions = ["part"]
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.organize.strategy, ClassificationStrategy::ByFileType);
        assert!(config.organize.parallel);
        assert!(config.filters.enable_hidden_files);
        assert_eq!(config.filters.exclude.filenames, vec!["Thumbs.db"]);
    }

    #[test]
    fn test_short_strategy_aliases() {
        let config = EngineConfig::from_toml("[organize]\nstrategy = \"type\"\n")
            .expect("config should parse");
        assert_eq!(config.organize.strategy, ClassificationStrategy::ByFileType);

        let config = EngineConfig::from_toml("[organize]\nstrategy = \"date\"\n")
            .expect("config should parse");
        assert_eq!(config.organize.strategy, ClassificationStrategy::ByDate);
    }

    #[test]
    fn test_invalid_toml_is_rejected() {
        let result = EngineConfig::from_toml("[organize]\nstrategy = \"colour\"\n");
        assert!(matches!(result, Err(ConfigError::ConfigInvalid(_))));
    }

    #[test]
    fn test_explicit_missing_file() {
        let result = EngineConfig::load(Some(Path::new("/non/existent/config.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[organize]\nparallel = true\n").expect("Failed to write config");

        let config = EngineConfig::load(Some(&path)).expect("config should load");
        assert!(config.organize.parallel);
    }

    #[test]
    fn test_hidden_file_excluded_by_default() {
        let compiled = FilterRules::default().compile().unwrap();

        assert!(!compiled.should_include(Path::new(".DS_Store")));
        assert!(!compiled.should_include(Path::new(".Operation.txt.tmp")));
        assert!(compiled.should_include(Path::new("IMG_0001.JPG")));
    }

    #[test]
    fn test_hidden_file_included_when_enabled() {
        let compiled = rules(ExcludeRules::default()).compile().unwrap();
        assert!(compiled.should_include(Path::new(".DS_Store")));
    }

    #[test]
    fn test_exclude_exact_filename() {
        let compiled = rules(ExcludeRules {
            filenames: vec!["Thumbs.db".to_string()],
            ..Default::default()
        })
        .compile()
        .unwrap();

        assert!(!compiled.should_include(Path::new("Thumbs.db")));
        assert!(compiled.should_include(Path::new("image.jpg")));
    }

    #[test]
    fn test_exclude_extensions_case_insensitive() {
        let compiled = rules(ExcludeRules {
            extensions: vec!["part".to_string(), ".TMP".to_string()],
            ..Default::default()
        })
        .compile()
        .unwrap();

        assert!(!compiled.should_include(Path::new("video.part")));
        assert!(!compiled.should_include(Path::new("video.PART")));
        assert!(!compiled.should_include(Path::new("scratch.tmp")));
        assert!(compiled.should_include(Path::new("photo.heic")));
    }

    #[test]
    fn test_exclude_glob_patterns() {
        let compiled = rules(ExcludeRules {
            patterns: vec!["*.xmp".to_string(), "IMG_[0-9]*_edit.*".to_string()],
            ..Default::default()
        })
        .compile()
        .unwrap();

        assert!(!compiled.should_include(Path::new("IMG_0001.xmp")));
        assert!(!compiled.should_include(Path::new("IMG_0042_edit.jpg")));
        assert!(compiled.should_include(Path::new("IMG_0042.jpg")));
    }

    #[test]
    fn test_include_overrides_exclude() {
        let compiled = FilterRules {
            enable_hidden_files: false,
            exclude: ExcludeRules {
                extensions: vec!["png".to_string()],
                ..Default::default()
            },
            include: IncludeRules {
                patterns: vec!["keep-*.png".to_string(), ".important".to_string()],
            },
        }
        .compile()
        .unwrap();

        assert!(compiled.should_include(Path::new("keep-me.png")));
        assert!(!compiled.should_include(Path::new("drop-me.png")));
        assert!(compiled.should_include(Path::new(".important")));
        assert!(!compiled.should_include(Path::new(".other")));
    }

    #[test]
    fn test_exclude_regex() {
        let compiled = rules(ExcludeRules {
            regex: vec![r"^~\$.*".to_string()],
            ..Default::default()
        })
        .compile()
        .unwrap();

        assert!(!compiled.should_include(Path::new("~$draft.docx")));
        assert!(compiled.should_include(Path::new("draft.docx")));
    }

    #[test]
    fn test_invalid_patterns_return_errors() {
        let bad_regex = rules(ExcludeRules {
            regex: vec!["[invalid(".to_string()],
            ..Default::default()
        });
        assert!(matches!(
            bad_regex.compile(),
            Err(ConfigError::InvalidRegexPattern { .. })
        ));

        let bad_glob = rules(ExcludeRules {
            patterns: vec!["[invalid".to_string()],
            ..Default::default()
        });
        assert!(matches!(
            bad_glob.compile(),
            Err(ConfigError::InvalidGlobPattern(_))
        ));
    }
}
