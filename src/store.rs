//! Filesystem side of a batch: the mod directory being read, the target
//! mod being written, and the scratch area archives are unpacked into.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Name of the scratch directory inside the target mod.
pub const STAGING_DIR: &str = "temporary_staging";

#[derive(Debug)]
pub struct FileStore {
    source_dir: PathBuf,
    target_dir: PathBuf,
    staging_dir: PathBuf,
}

impl FileStore {
    /// Prepare the target mod directory and its staging area.
    ///
    /// A missing target is created. An existing target must be empty
    /// unless `clean` is set, in which case its contents are removed.
    pub fn open(source_dir: impl Into<PathBuf>, target_dir: impl Into<PathBuf>, clean: bool) -> Result<Self> {
        let source_dir = source_dir.into();
        let target_dir = target_dir.into();

        if !target_dir.exists() {
            fs::create_dir_all(&target_dir)?;
        } else if fs::read_dir(&target_dir)?.next().is_some() {
            if !clean {
                return Err(Error::TargetNotEmpty(target_dir));
            }
            tracing::info!("Cleaning target mod: {}", target_dir.display());
            clean_directory(&target_dir)?;
        }

        let staging_dir = target_dir.join(STAGING_DIR);
        fs::create_dir_all(&staging_dir)?;

        Ok(FileStore {
            source_dir,
            target_dir,
            staging_dir,
        })
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// The `*.mod` descriptors directly inside the source directory, sorted.
    pub fn discover_descriptors(&self) -> Result<Vec<PathBuf>> {
        let mut descriptors = Vec::new();
        for entry in fs::read_dir(&self.source_dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mod")) {
                descriptors.push(path);
            }
        }
        descriptors.sort();
        Ok(descriptors)
    }

    /// Unpack an archived mod into the staging area and return its root.
    pub fn stage_archive(&self, archive: &Path) -> Result<PathBuf> {
        clean_directory(&self.staging_dir)?;
        let file = File::open(archive)?;
        let mut zip = zip::ZipArchive::new(file)?;
        zip.extract(&self.staging_dir)?;
        tracing::debug!("Staged {} ({} entries)", archive.display(), zip.len());
        Ok(self.staging_dir.clone())
    }

    /// Empty the staging area for the next archive.
    pub fn clear_staging(&self) -> Result<()> {
        clean_directory(&self.staging_dir)
    }

    /// Resolve a path inside the target mod, creating the intermediate
    /// directories.
    pub fn destination(&self, dirs: &[String], file_name: &str) -> Result<PathBuf> {
        let mut path = self.target_dir.clone();
        for dir in dirs {
            path.push(dir);
        }
        fs::create_dir_all(&path)?;
        path.push(file_name);
        Ok(path)
    }

    /// Remove the staging area once the batch is over.
    pub fn finish(self) -> Result<()> {
        if self.staging_dir.exists() {
            fs::remove_dir_all(&self.staging_dir)?;
        }
        Ok(())
    }
}

/// Read a file as text. Invalid UTF-8 is replaced rather than rejected;
/// mod files in the wild are often Latin-1.
pub fn load_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Every file below `root`, sorted.
pub fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// The path segments leading from `root` to `file`, file name last.
/// `None` when `file` is not below `root`.
pub fn relative_segments(root: &Path, file: &Path) -> Option<Vec<String>> {
    let relative = file.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// Remove everything inside `dir`, keeping the directory itself.
pub fn clean_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Replace `path` with `text` through a temporary file in the same
/// directory, so readers never see a half-written file.
pub fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(text.as_bytes())?;
    file.flush()?;
    file.persist(path).map_err(|err| Error::Io(err.error))?;
    Ok(())
}

/// Copy `from` to `to` unless something already lives at `to`. Returns
/// whether a copy was made.
pub fn copy_if_absent(from: &Path, to: &Path) -> Result<bool> {
    if to.exists() {
        return Ok(false);
    }
    fs::copy(from, to)?;
    Ok(true)
}
