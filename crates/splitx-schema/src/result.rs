use crate::app_meta::AppMeta;
use crate::category::SplitCategory;
use crate::types::PackageName;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structural problems that make a split APK source uninstallable.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitError {
    #[error("{entry} has no AndroidManifest.xml")]
    NoManifestInPackage { entry: String },
    #[error("{entry} has more than one <manifest> root element")]
    DuplicateManifestRoot { entry: String },
    #[error("{entry} has no valid <manifest> element: {reason}")]
    NoManifestElement { entry: String, reason: String },
    #[error("{entry} belongs to package {found}, expected {expected}")]
    PackageMismatch {
        entry: String,
        expected: PackageName,
        found: PackageName,
    },
    #[error("{entry} has version code {found}, expected {expected}")]
    VersionMismatch {
        entry: String,
        expected: u64,
        found: u64,
    },
    #[error("more than one base APK: {first} and {second}")]
    MultipleBaseApks { first: String, second: String },
    #[error("no APK files found in the source")]
    NoPackagesFound,
}

/// A failed resolution: the error plus whether it must stop the install flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionError {
    pub error: SplitError,
    pub fatal: bool,
    pub message: String,
}

impl ResolutionError {
    pub fn new(error: SplitError, fatal: bool) -> Self {
        let message = error.to_string();
        Self {
            error,
            fatal,
            message,
        }
    }

    pub fn fatal(error: SplitError) -> Self {
        Self::new(error, true)
    }
}

impl std::fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Installer-ready description of a split APK source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitApkSourceMeta {
    pub app_meta: AppMeta,
    /// Non-empty categories in priority order.
    pub categories: Vec<SplitCategory>,
    /// Names of non-APK entries, in encounter order.
    pub auxiliary_files: Vec<String>,
}

impl SplitApkSourceMeta {
    pub fn parts(&self) -> impl Iterator<Item = &crate::category::SplitPart> {
        self.categories.iter().flat_map(|c| c.parts.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum ResolutionResult {
    Success(SplitApkSourceMeta),
    Failure(ResolutionError),
}

impl ResolutionResult {
    pub fn failure(error: SplitError) -> Self {
        ResolutionResult::Failure(ResolutionError::fatal(error))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResolutionResult::Success(_))
    }

    pub fn meta(&self) -> Option<&SplitApkSourceMeta> {
        match self {
            ResolutionResult::Success(meta) => Some(meta),
            ResolutionResult::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ResolutionError> {
        match self {
            ResolutionResult::Success(_) => None,
            ResolutionResult::Failure(err) => Some(err),
        }
    }
}
