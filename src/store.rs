// SPDX-FileCopyrightText: 2025 Robin Vobruba <hoijui.quaero@gmail.com>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use async_std::{fs, io};
use fs4::async_std::AsyncFileExt;
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

use crate::{model::package::Package, tools};

pub const DATA_DIR_NAME: &str = "data";
pub const METADATA_DIR_NAME: &str = "metadata";
pub const LOCK_FILE_NAME: &str = ".lock";
/// Prefix of files that are still being downloaded.
/// Finished data files never start with it.
pub const PARTIAL_PREFIX: &str = ".";
/// Suffix of files that are still being downloaded.
pub const PARTIAL_SUFFIX: &str = ".part";

pub(crate) async fn ensure_dir_exists<P: AsRef<Path>>(dir: P) -> io::Result<()> {
    let dir = async_std::path::Path::new(dir.as_ref().as_os_str());
    if !dir.exists().await {
        fs::create_dir_all(dir).await?;
    }
    Ok(())
}

fn construct_file_path<P: AsRef<Path>, S: AsRef<str>>(dir: P, file_name: S, temp: bool) -> PathBuf {
    if temp {
        dir.as_ref()
            .join(format!("{file_name}.temp", file_name = file_name.as_ref()))
    } else {
        dir.as_ref().join(file_name.as_ref())
    }
}

/// Reduces a media type to something safe to use as a file extension.
fn sanitize_extension(media_type: &str) -> String {
    media_type
        .to_lowercase()
        .chars()
        .map(|chr| {
            if chr.is_ascii_alphanumeric() || matches!(chr, '.' | '-' | '_') {
                chr
            } else {
                '_'
            }
        })
        .collect()
}

/// Where a crawl of a single portal stores its results.
///
/// ```text
/// <root>/
///   data/<resource-id>.<media-type>
///   metadata/meta_<custom-id>.json
///   resume_<cleaned-domain>.txt
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    data_dir: PathBuf,
    metadata_dir: PathBuf,
    resume_file: PathBuf,
}

impl Layout {
    /// Derives the layout for a portal domain.
    /// Without an explicit output root, the current working directory is used.
    #[must_use]
    pub fn new(output_root: Option<&Path>, domain: &str) -> Self {
        let cleaned = tools::clean_url(domain);
        let base = output_root.map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let root = base.join(&cleaned);
        Self {
            data_dir: root.join(DATA_DIR_NAME),
            metadata_dir: root.join(METADATA_DIR_NAME),
            resume_file: root.join(format!("resume_{cleaned}.txt")),
            root,
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[must_use]
    pub fn resume_file(&self) -> &Path {
        &self.resume_file
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.root.join(LOCK_FILE_NAME)
    }

    /// Creates all the directories of this layout.
    pub async fn bootstrap(&self) -> io::Result<()> {
        ensure_dir_exists(&self.data_dir).await?;
        ensure_dir_exists(&self.metadata_dir).await?;
        Ok(())
    }

    /// The final location of a downloaded resource.
    #[must_use]
    pub fn data_file(&self, resource_id: &str, media_type: Option<&str>) -> PathBuf {
        data_file(&self.data_dir, resource_id, media_type)
    }

    #[must_use]
    pub fn metadata_file(&self, custom_id: &str, temp: bool) -> PathBuf {
        construct_file_path(&self.metadata_dir, format!("meta_{custom_id}.json"), temp)
    }

    /// Writes the metadata of a package to its JSON file,
    /// going through a temporary file,
    /// so a crash never leaves a half-written record behind.
    pub async fn write_metadata(&self, package: &Package) -> io::Result<PathBuf> {
        let json = serde_json::to_string_pretty(package)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        let temp_file_path = self.metadata_file(&package.custom_id, true);
        let file_path = self.metadata_file(&package.custom_id, false);
        fs::write(&temp_file_path, json).await?;
        fs::rename(&temp_file_path, &file_path).await?;
        Ok(file_path)
    }

    /// Takes an exclusive lock on this layout,
    /// so no two crawls write into the same output.
    ///
    /// The lock is held until the returned guard is released or dropped.
    pub async fn lock(&self) -> io::Result<RunLock> {
        let path = self.lock_file();
        if !async_std::path::Path::new(path.as_os_str()).exists().await {
            fs::File::create(&path).await?;
        }
        tracing::debug!("Preparing to lock file '{}' ...", path.display());
        let file = fs::File::open(&path).await?;
        if !file.try_lock_exclusive()? {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!(
                    "Failed to lock file '{}'; is another crawl of this portal running?",
                    path.display()
                ),
            ));
        }
        tracing::debug!("Obtained lock on file '{}'.", path.display());
        Ok(RunLock { path, file })
    }
}

/// The final location of a downloaded resource within `data_dir`.
#[must_use]
pub fn data_file(data_dir: &Path, resource_id: &str, media_type: Option<&str>) -> PathBuf {
    match media_type.map(sanitize_extension) {
        Some(ext) if !ext.is_empty() => data_dir.join(format!("{resource_id}.{ext}")),
        _ => data_dir.join(resource_id),
    }
}

/// Where a resource is written to while its download is in progress:
/// a hidden sibling of `final_path`.
#[must_use]
pub fn partial_file(final_path: &Path) -> PathBuf {
    let mut name = OsString::from(PARTIAL_PREFIX);
    if let Some(file_name) = final_path.file_name() {
        name.push(file_name);
    }
    name.push(PARTIAL_SUFFIX);
    final_path.with_file_name(name)
}

/// Whether `file_name` is one produced by [`partial_file`].
#[must_use]
pub fn is_partial_file(file_name: &OsStr) -> bool {
    file_name.to_str().is_some_and(|name| {
        name.len() > PARTIAL_PREFIX.len() + PARTIAL_SUFFIX.len()
            && name.starts_with(PARTIAL_PREFIX)
            && name.ends_with(PARTIAL_SUFFIX)
    })
}

/// Exclusive lock on a [`Layout`], see [`Layout::lock`].
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: fs::File,
}

impl RunLock {
    pub fn release(self) -> io::Result<()> {
        tracing::trace!("Releasing lock on file '{}' ...", self.path.display());
        self.file.unlock()?;
        tracing::debug!("Released lock on file '{}'.", self.path.display());
        Ok(())
    }
}
