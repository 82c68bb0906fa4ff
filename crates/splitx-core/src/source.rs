//! Entry sources: the archives and directories a resolution reads from.

use crate::CoreError;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

/// One entry of a split APK source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// `/`-separated path inside the source.
    pub name: String,
    /// Where the entry lives: the in-archive path for zip sources, the
    /// filesystem path for directory sources.
    pub local_path: String,
}

impl SourceEntry {
    pub fn is_apk(&self) -> bool {
        has_extension(&self.name, "apk")
    }
}

/// ASCII case-insensitive check for a `.<ext>` suffix.
pub fn has_extension(name: &str, ext: &str) -> bool {
    name.len() > ext.len()
        && name.as_bytes()[name.len() - ext.len() - 1] == b'.'
        && name[name.len() - ext.len()..].eq_ignore_ascii_case(ext)
}

/// Lowercased extension of the final path component, if any.
pub fn extension_of(name: &str) -> Option<String> {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let (stem, ext) = file_name.rsplit_once('.')?;
    (!stem.is_empty() && !ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Sequential, single-pass access to the entries of a split APK source.
///
/// Entries are yielded in enumeration order. `open_entry` reads the entry last
/// returned by `next_entry`; its reader must be dropped before advancing.
pub trait ApkSource {
    /// File name of the source, used to pick a metadata extractor.
    fn name(&self) -> &str;

    fn next_entry(&mut self) -> Result<Option<SourceEntry>, CoreError>;

    fn open_entry(&mut self) -> Result<Box<dyn Read + '_>, CoreError>;
}

/// Zip-based source: `.zip`, `.apks`, `.xapk`, `.apkm`.
pub struct ZipApkSource<R = File> {
    name: String,
    archive: ZipArchive<R>,
    next_index: usize,
    current: Option<usize>,
}

impl ZipApkSource<File> {
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let file = File::open(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_reader(name, file)
    }
}

impl<R: Read + Seek> ZipApkSource<R> {
    pub fn from_reader(name: impl Into<String>, reader: R) -> Result<Self, CoreError> {
        let archive = ZipArchive::new(reader)?;
        let name = name.into();
        debug!("opened {name} with {} entries", archive.len());
        Ok(Self {
            name,
            archive,
            next_index: 0,
            current: None,
        })
    }
}

impl<R: Read + Seek> ApkSource for ZipApkSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_entry(&mut self) -> Result<Option<SourceEntry>, CoreError> {
        while self.next_index < self.archive.len() {
            let index = self.next_index;
            self.next_index += 1;
            let file = self.archive.by_index_raw(index)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_owned();
            self.current = Some(index);
            return Ok(Some(SourceEntry {
                local_path: name.clone(),
                name,
            }));
        }
        self.current = None;
        Ok(None)
    }

    fn open_entry(&mut self) -> Result<Box<dyn Read + '_>, CoreError> {
        let index = self
            .current
            .ok_or_else(|| CoreError::Config("no current entry to open".to_owned()))?;
        Ok(Box::new(self.archive.by_index(index)?))
    }
}

/// Unpacked source: every regular file below a directory, in sorted path order.
pub struct DirectoryApkSource {
    name: String,
    files: std::vec::IntoIter<(String, PathBuf)>,
    current: Option<PathBuf>,
}

impl DirectoryApkSource {
    pub fn open(root: &Path) -> Result<Self, CoreError> {
        let mut files = Vec::new();
        collect_files(root, root, &mut files)?;
        files.sort();
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        debug!("scanned {} with {} files", root.display(), files.len());
        Ok(Self {
            name,
            files: files.into_iter(),
            current: None,
        })
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, PathBuf)>,
) -> Result<(), CoreError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push((name, path));
        }
    }
    Ok(())
}

impl ApkSource for DirectoryApkSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn next_entry(&mut self) -> Result<Option<SourceEntry>, CoreError> {
        let Some((name, path)) = self.files.next() else {
            self.current = None;
            return Ok(None);
        };
        let entry = SourceEntry {
            name,
            local_path: path.to_string_lossy().into_owned(),
        };
        self.current = Some(path);
        Ok(Some(entry))
    }

    fn open_entry(&mut self) -> Result<Box<dyn Read + '_>, CoreError> {
        let path = self
            .current
            .as_ref()
            .ok_or_else(|| CoreError::Config("no current entry to open".to_owned()))?;
        Ok(Box::new(File::open(path)?))
    }
}
