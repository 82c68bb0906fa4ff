//! Split metadata, classification, and resolution result types for splitx.
//!
//! This crate defines the schema layer: the classified view of a package's
//! manifest (`SplitMeta`, with the classifier in `SplitMeta::from_attributes`),
//! device configuration qualifiers (`Abi`, `LocaleTag`, `ScreenDensity`), the
//! per-resolution `SplitCategoryIndex`, app metadata, and the `ResolutionResult`
//! with its `SplitError` taxonomy. It performs no I/O.

pub mod app_meta;
pub mod category;
pub mod qualifier;
pub mod result;
pub mod split_meta;
pub mod types;

pub use app_meta::{AppIcon, AppMeta};
pub use category::{Category, SplitCategory, SplitCategoryIndex, SplitPart};
pub use qualifier::{Abi, LocaleTag, ScreenDensity};
pub use result::{ResolutionError, ResolutionResult, SplitApkSourceMeta, SplitError};
pub use split_meta::{ManifestAttributes, MetaError, SplitKind, SplitMeta};
pub use types::{ModuleName, PackageName};
