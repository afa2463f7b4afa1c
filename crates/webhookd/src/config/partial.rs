use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use toml::Spanned;

use super::diagnostics::{Diagnostic, Error, LoadError, MergeError, SourceInfo, SourceLocation, Warning};
use super::LogLevel;

#[derive(Debug, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub server: Option<PartialServerConfig>,
    pub logging: Option<PartialLoggingConfig>,
    pub auth: Option<PartialAuthConfig>,
    pub home_assistant: Option<PartialHomeAssistantConfig>,

    #[serde(default)]
    pub switches: Vec<PartialSwitch>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialServerConfig {
    pub listen: Option<Spanned<String>>,
    pub port: Option<Spanned<u16>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, Spanned<LogLevel>>>,
}

#[derive(Clone, Default, Deserialize)]
pub struct PartialAuthConfig {
    pub jwt_secret: Option<Spanned<String>>,
}

impl std::fmt::Debug for PartialAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartialAuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct PartialHomeAssistantConfig {
    pub url: Option<Spanned<String>>,
    pub token: Option<Spanned<String>>,
    pub timeout_secs: Option<Spanned<u64>>,
}

impl std::fmt::Debug for PartialHomeAssistantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartialHomeAssistantConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartialSwitch {
    pub id: Spanned<String>,
    pub name: Option<String>,
    pub icon: Option<String>,

    /// File this switch was defined in (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,
}

impl PartialSwitch {
    /// Location of the switch id, for labelling diagnostics
    pub fn id_location(&self) -> Option<SourceLocation> {
        self.source.as_ref().map(|s| s.locate(self.id.span()))
    }
}

/// First-wins merging of scalar fields with conflict tracking
#[derive(Default)]
struct Merger {
    /// Where each field path was first set
    locations: HashMap<String, SourceLocation>,
    diagnostics: Vec<Diagnostic>,
}

impl Merger {
    fn field<T>(
        &mut self,
        field_path: &str,
        slot: &mut Option<Spanned<T>>,
        value: Option<Spanned<T>>,
        source: &SourceInfo,
    ) {
        let Some(value) = value else {
            return;
        };
        let location = source.locate(value.span());

        if let Some(prev) = self.locations.get(field_path) {
            // Conflict: keep first value, record error
            self.diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                field_path: field_path.to_string(),
                message: format!("'{}' defined in multiple config files", field_path),
                conflicts: vec![prev.clone(), location],
            })));
        } else {
            *slot = Some(value);
            self.locations.insert(field_path.to_string(), location);
        }
    }
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        Self::from_content(path, content)
    }

    /// Parse config content that was read from `path`
    pub fn from_content(path: &Path, content: String) -> Result<Self, LoadError> {
        let mut config: PartialConfig = toml::from_str(&content).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            error: e,
        })?;

        let source = SourceInfo {
            file_path: path.to_path_buf(),
            content,
        };
        for switch in &mut config.switches {
            switch.source = Some(source.clone());
        }
        config.source = Some(source);

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Each config file is loaded, then its imports are recursively processed.
    /// Cycle detection prevents infinite loops.
    ///
    /// Returns a Vec of all loaded configs in order (imports first, then parent)
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    /// Recursively load a config file and its imports
    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        // Canonicalize the path to detect cycles reliably
        let canonical_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path.clone(),
                cycle: visited.iter().cloned().collect(),
            });
        }

        visited.insert(canonical_path.clone());

        let config = Self::from_file(path)?;

        // Process imports first (depth-first)
        for import_path in &config.imports {
            let import_path_buf = PathBuf::from(import_path);

            // Resolve relative imports from the parent file's directory
            let resolved_path = if import_path_buf.is_absolute() {
                import_path_buf
            } else {
                let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
                parent_dir.join(import_path_buf)
            };

            Self::load_recursive(&resolved_path, visited, configs)?;
        }

        configs.push(config);

        // Remove from visited set to allow imports from sibling branches
        visited.remove(&canonical_path);

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.server.is_none()
            && self.logging.is_none()
            && self.auth.is_none()
            && self.home_assistant.is_none()
            && self.switches.is_empty()
            && self.imports.is_empty()
    }

    /// Merge multiple partial configs together
    ///
    /// Scalar fields use first-wins semantics; a field set in more than one file is
    /// recorded as an error and merging continues so that every conflict is reported
    /// at once. Switch lists are concatenated in load order.
    ///
    /// Returns (merged, diagnostics) where diagnostics may contain warnings and errors
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut merger = Merger::default();
        let mut imports = Vec::new();

        for config in configs {
            let source_info = config.source.clone().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            if config.is_empty() {
                merger.diagnostics.push(Diagnostic::Warning(Warning::EmptyConfig {
                    file_path: source_info.file_path.clone(),
                }));
            }

            imports.extend(config.imports);

            if let Some(server) = config.server {
                let target = result.server.get_or_insert_with(Default::default);
                merger.field("server.listen", &mut target.listen, server.listen, &source_info);
                merger.field("server.port", &mut target.port, server.port, &source_info);
            }

            if let Some(logging) = config.logging {
                let target = result.logging.get_or_insert_with(Default::default);
                merger.field("logging.level", &mut target.level, logging.level, &source_info);

                for (key, value) in logging.overrides.unwrap_or_default() {
                    let overrides = target.overrides.get_or_insert_with(HashMap::new);
                    let mut slot = overrides.remove(&key);
                    merger.field(
                        &format!("logging.overrides.{}", key),
                        &mut slot,
                        Some(value),
                        &source_info,
                    );
                    if let Some(slot) = slot {
                        overrides.insert(key, slot);
                    }
                }
            }

            if let Some(auth) = config.auth {
                let target = result.auth.get_or_insert_with(Default::default);
                merger.field("auth.jwt_secret", &mut target.jwt_secret, auth.jwt_secret, &source_info);
            }

            if let Some(ha) = config.home_assistant {
                let target = result.home_assistant.get_or_insert_with(Default::default);
                merger.field("home_assistant.url", &mut target.url, ha.url, &source_info);
                merger.field("home_assistant.token", &mut target.token, ha.token, &source_info);
                merger.field(
                    "home_assistant.timeout_secs",
                    &mut target.timeout_secs,
                    ha.timeout_secs,
                    &source_info,
                );
            }

            result.switches.extend(config.switches);
        }

        result.imports = imports;

        (result, merger.diagnostics)
    }
}
