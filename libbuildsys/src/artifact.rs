//! Resolution of cached build-time dependency artifacts.

use glob::{Pattern, PatternError};
use std::fs;
use std::path::{Path, PathBuf};

/// A directory of previously prepared build-time dependency artifacts,
/// addressed by filename.
///
/// The cache performs no hashing and no eviction. Content integrity is the
/// responsibility of whatever produced the cached files, and staleness is
/// controlled by whatever persists the directory across builds.
#[derive(Debug, Clone, Default)]
pub struct Cache {
    pub path: PathBuf,
}

impl Cache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn contains(&self, file_name: &str) -> bool {
        self.path.join(file_name).is_file()
    }
}

/// A named configuration option with a default artifact selection pattern.
///
/// An explicit `value` (typically user-provided) overrides the default;
/// configuration discovery itself happens outside this crate.
#[derive(Debug, Clone)]
pub struct BuildConfiguration {
    pub name: String,
    pub default: String,
    pub value: Option<String>,
}

impl BuildConfiguration {
    pub fn new(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            value: None,
        }
    }

    fn pattern(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.default)
    }
}

/// Resolves which cached artifact file applies to the current build.
#[derive(Debug, Clone, Default)]
pub struct ArtifactResolver {
    pub configurations: Vec<BuildConfiguration>,
}

impl ArtifactResolver {
    #[must_use]
    pub fn new(configurations: Vec<BuildConfiguration>) -> Self {
        Self { configurations }
    }

    /// Resolves exactly one artifact file directly under the cache directory.
    ///
    /// Exactly one configured option must match exactly one file. Zero matches
    /// across all options is [`ResolveError::NotFound`]; more than one match,
    /// whether through a single pattern or through multiple options, is
    /// [`ResolveError::Ambiguous`]. There is no best-effort selection.
    pub fn resolve(&self, cache: &Cache) -> Result<PathBuf, ResolveError> {
        let file_names = cache_file_names(&cache.path)?;

        let mut matches = Vec::new();
        for configuration in &self.configurations {
            let pattern = Pattern::new(configuration.pattern()).map_err(|error| {
                ResolveError::InvalidPattern(configuration.pattern().to_string(), error)
            })?;

            let mut matched = file_names
                .iter()
                .filter(|file_name| pattern.matches(file_name))
                .map(|file_name| cache.path.join(file_name))
                .collect::<Vec<_>>();

            if matched.len() > 1 {
                return Err(ResolveError::Ambiguous(
                    configuration.pattern().to_string(),
                    matched,
                ));
            }

            matches.append(&mut matched);
        }

        if matches.len() > 1 {
            return Err(ResolveError::Ambiguous(self.patterns().join(", "), matches));
        }

        matches
            .pop()
            .ok_or_else(|| ResolveError::NotFound(cache.path.clone(), self.patterns()))
    }

    fn patterns(&self) -> Vec<String> {
        self.configurations
            .iter()
            .map(|configuration| configuration.pattern().to_string())
            .collect()
    }
}

// Regular files only; filenames sorted so error listings are stable.
fn cache_file_names(cache_path: &Path) -> Result<Vec<String>, ResolveError> {
    let mut file_names = Vec::new();
    for dir_entry in fs::read_dir(cache_path)? {
        let dir_entry = dir_entry?;
        if dir_entry.file_type()?.is_file() {
            file_names.push(dir_entry.file_name().to_string_lossy().into_owned());
        }
    }
    file_names.sort();
    Ok(file_names)
}

#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error("Invalid artifact selection pattern `{0}`: {1}")]
    InvalidPattern(String, #[source] PatternError),

    #[error("No build-time dependency artifact in {0} matched {1:?}")]
    NotFound(PathBuf, Vec<String>),

    #[error("Expected exactly one build-time dependency artifact, but `{0}` matched {1:?}")]
    Ambiguous(String, Vec<PathBuf>),

    #[error("I/O error while resolving artifacts: {0}")]
    Io(#[from] std::io::Error),
}
