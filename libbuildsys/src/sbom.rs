//! Software Bill of Materials (SBOM) generation contract.

use crate::execution::{Execution, ExecutionError, Executor};
use crate::log::Logger;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// SBOM formats supported by the platform.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Deserialize, Serialize)]
pub enum SbomFormat {
    /// Cyclone DX (JSON)
    ///
    /// See: <https://cyclonedx.org/>
    #[serde(rename = "application/vnd.cyclonedx+json")]
    CycloneDxJson,

    /// SPDX (JSON)
    ///
    /// See: <https://spdx.dev/>
    #[serde(rename = "application/spdx+json")]
    SpdxJson,

    /// Syft (JSON)
    ///
    /// See: <https://github.com/anchore/syft>
    #[serde(rename = "application/vnd.syft+json")]
    SyftJson,
}

/// All currently supported SBOM formats.
pub const SBOM_FORMATS: &[SbomFormat] = &[
    SbomFormat::CycloneDxJson,
    SbomFormat::SpdxJson,
    SbomFormat::SyftJson,
];

impl SbomFormat {
    /// The output identifier the syft CLI understands for this format.
    #[must_use]
    pub fn syft_output_id(self) -> &'static str {
        match self {
            SbomFormat::CycloneDxJson => "cyclonedx-json",
            SbomFormat::SpdxJson => "spdx-json",
            SbomFormat::SyftJson => "syft-json",
        }
    }

    /// The file suffix for SBOM files laid down next to a layer.
    #[must_use]
    pub fn file_suffix(self) -> &'static str {
        match self {
            SbomFormat::CycloneDxJson => "cdx.json",
            SbomFormat::SpdxJson => "spdx.json",
            SbomFormat::SyftJson => "syft.json",
        }
    }
}

/// Path of the SBOM file for `base_name` in the given format.
#[must_use]
pub fn sbom_path(format: SbomFormat, base_directory: &Path, base_name: &str) -> PathBuf {
    base_directory.join(format!("{base_name}.sbom.{}", format.file_suffix()))
}

/// Capability to emit SBOMs for a built application directory.
///
/// Scanning happens after a successful build and is mandatory: a scan failure
/// is a build failure, never best-effort.
pub trait SbomScanner {
    fn scan_build(
        &mut self,
        application_path: &Path,
        formats: &[SbomFormat],
    ) -> Result<(), ScanError>;
}

/// [`SbomScanner`] that shells out to the anchore `syft` CLI, writing one SBOM
/// file per requested format into `output_dir`.
pub struct SyftScanner {
    pub executor: Box<dyn Executor>,
    pub output_dir: PathBuf,
    pub base_name: String,
    pub logger: Logger,
}

impl SbomScanner for SyftScanner {
    fn scan_build(
        &mut self,
        application_path: &Path,
        formats: &[SbomFormat],
    ) -> Result<(), ScanError> {
        let mut args = vec![
            String::from("scan"),
            format!("dir:{}", application_path.display()),
            String::from("--quiet"),
        ];
        for format in formats {
            args.push(String::from("-o"));
            args.push(format!(
                "{}={}",
                format.syft_output_id(),
                sbom_path(*format, &self.output_dir, &self.base_name).display()
            ));
        }

        self.executor
            .execute(Execution {
                command: String::from("syft"),
                args,
                dir: application_path.to_path_buf(),
                stdout: &mut self.logger.writer(),
                stderr: &mut self.logger.writer(),
            })
            .map_err(ScanError::Syft)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("SBOM scan failed: {0}")]
    Syft(#[source] ExecutionError),

    #[error("SBOM scan failed: {0}")]
    Other(String),
}
