//! The build-and-package contribution orchestrator.

use crate::artifact::{ArtifactResolver, Cache, ResolveError};
use crate::bom::{Bom, BomEntry};
use crate::execution::{Execution, ExecutionError, Executor};
use crate::layer::{Layer, LayerContributor, LayerError, LayerTypes};
use crate::log::Logger;
use crate::sbom::{SbomFormat, SbomScanner, ScanError};
use crate::zip::zip_directory;
use std::fs;
use std::path::{Path, PathBuf};

/// Orchestrates one contribution of a built, packaged application layer.
///
/// Constructed once per build invocation and consumed by exactly one
/// [`contribute`](Application::contribute) call.
pub struct Application {
    /// The application source directory. The build command runs inside it and
    /// packaging mutates it in place.
    pub path: PathBuf,
    pub command: String,
    pub arguments: Vec<String>,
    pub artifact_resolver: ArtifactResolver,
    pub cache: Cache,
    pub executor: Box<dyn Executor>,
    pub logger: Logger,
    pub bom: Bom,
    pub sbom_scanner: Box<dyn SbomScanner>,
    /// Whether a build-materials entry is appended for the produced artifact.
    /// The buildpack API version threshold that decides this is external
    /// policy; callers resolve it once at construction time.
    pub include_bom_entry: bool,
    /// Version recorded in the build-materials entry, when the caller has one.
    pub artifact_version: Option<String>,
}

impl Application {
    /// Contributes the application layer, reusing a previously built layer
    /// when the build command and arguments are unchanged.
    ///
    /// On a rebuild the configured command runs against the application
    /// directory, the directory is packaged into `<layer>/application.zip`,
    /// the original unpacked sources are removed, the layer is marked
    /// cacheable, SBOMs are generated and a build-materials entry is appended
    /// (subject to `include_bom_entry`). Any failure aborts the contribution
    /// and leaves the layer's persisted state untouched.
    pub fn contribute(self, layer: Layer) -> Result<Layer, ContributeError> {
        let mut expected_metadata = toml::Table::new();
        expected_metadata.insert(
            String::from("command"),
            toml::Value::String(self.command.clone()),
        );
        expected_metadata.insert(
            String::from("arguments"),
            toml::Value::Array(
                self.arguments
                    .iter()
                    .cloned()
                    .map(toml::Value::String)
                    .collect(),
            ),
        );

        let contributor = LayerContributor::new(
            expected_metadata,
            LayerTypes {
                cache: true,
                ..LayerTypes::default()
            },
        );

        let Application {
            path,
            command,
            arguments,
            artifact_resolver,
            cache,
            mut executor,
            logger,
            bom,
            mut sbom_scanner,
            include_bom_entry,
            artifact_version,
        } = self;

        contributor.contribute(layer, |mut layer| {
            // Everything present before the build runs is original unpacked
            // source material and gets dropped once it is packaged.
            let original_entries = directory_entries(&path)?;

            logger.body(format!(
                "Executing {} {}",
                command_base(&command),
                arguments.join(" ")
            ))?;
            executor.execute(Execution {
                command: command.clone(),
                args: arguments.clone(),
                dir: path.clone(),
                stdout: &mut logger.writer(),
                stderr: &mut logger.writer(),
            })?;

            let dependency = artifact_resolver.resolve(&cache)?;
            logger.body(format!(
                "Using build-time dependency {}",
                dependency.display()
            ))?;

            let archive = layer.path().join("application.zip");
            zip_directory(&path, &archive)?;

            for entry in &original_entries {
                remove_entry(entry)?;
            }

            layer.types.cache = true;

            sbom_scanner.scan_build(&path, &[SbomFormat::CycloneDxJson, SbomFormat::SyftJson])?;

            if include_bom_entry {
                bom.append(bom_entry(
                    &archive,
                    &dependency,
                    &command,
                    &arguments,
                    artifact_version.clone(),
                ));
            }

            Ok(layer)
        })
    }
}

fn bom_entry(
    archive: &Path,
    dependency: &Path,
    command: &str,
    arguments: &[String],
    artifact_version: Option<String>,
) -> BomEntry {
    let mut metadata = toml::Table::new();
    metadata.insert(
        String::from("archive"),
        toml::Value::String(archive.display().to_string()),
    );
    metadata.insert(
        String::from("dependency"),
        toml::Value::String(dependency.display().to_string()),
    );
    metadata.insert(
        String::from("command"),
        toml::Value::String(String::from(command)),
    );
    metadata.insert(
        String::from("arguments"),
        toml::Value::Array(
            arguments
                .iter()
                .cloned()
                .map(toml::Value::String)
                .collect(),
        ),
    );

    BomEntry {
        name: String::from("application"),
        version: artifact_version.unwrap_or_default(),
        metadata,
    }
}

fn command_base(command: &str) -> String {
    Path::new(command)
        .file_name()
        .map_or_else(|| String::from(command), |name| name.to_string_lossy().into_owned())
}

fn directory_entries(dir: &Path) -> Result<Vec<PathBuf>, ContributeError> {
    let mut entries = Vec::new();
    for dir_entry in fs::read_dir(dir).map_err(ContributeError::Io)? {
        entries.push(dir_entry.map_err(ContributeError::Io)?.path());
    }
    Ok(entries)
}

fn remove_entry(path: &Path) -> Result<(), std::io::Error> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ContributeError {
    #[error("Couldn't resolve build-time dependency artifact: {0}")]
    Resolution(#[from] ResolveError),

    #[error("Build command failed: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Couldn't package application: {0}")]
    Packaging(#[from] crate::zip::Error),

    #[error("{0}")]
    Scan(#[from] ScanError),

    #[error("{0}")]
    Layer(#[from] LayerError),

    #[error("I/O error during contribution: {0}")]
    Io(#[from] std::io::Error),
}
