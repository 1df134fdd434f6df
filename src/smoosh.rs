//! The batch driver: every mod in a directory merged into one target mod.

use std::path::{Path, PathBuf};

use crate::descriptor::ModDescriptor;
use crate::error::Result;
use crate::mapping::{self, FileRule};
use crate::merge::{self, MergeOutcome, ResolutionSurface};
use crate::store::{self, FileStore};

/// Inputs of a batch run.
#[derive(Debug, Clone)]
pub struct SmooshOptions {
    /// Directory holding the `.mod` descriptors.
    pub source_dir: PathBuf,
    /// Name of the mod to create; it lives at `<source_dir>/<target_mod>`.
    pub target_mod: String,
    /// Empty an existing, non-empty target instead of refusing to run.
    pub clean: bool,
}

impl SmooshOptions {
    pub fn target_dir(&self) -> PathBuf {
        self.source_dir.join(&self.target_mod)
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub mods: usize,
    pub skipped_mods: usize,
    pub created: usize,
    pub merged: usize,
    pub unchanged: usize,
    pub migrated: usize,
    pub failed: usize,
}

pub struct Smoosher<R: ResolutionSurface> {
    options: SmooshOptions,
    resolver: R,
}

impl<R: ResolutionSurface> Smoosher<R> {
    pub fn new(options: SmooshOptions, resolver: R) -> Self {
        Smoosher { options, resolver }
    }

    /// Merge every mod found in the source directory, in descriptor order.
    ///
    /// Only preparing the target can fail the run. A broken descriptor
    /// skips its mod and a broken file skips that file; both are logged.
    pub fn run(&mut self) -> Result<RunSummary> {
        let store = FileStore::open(&self.options.source_dir, self.options.target_dir(), self.options.clean)?;
        let mut summary = RunSummary::default();

        let descriptors = store.discover_descriptors()?;
        if descriptors.is_empty() {
            tracing::warn!("No mods found in {}", store.source_dir().display());
        }

        for descriptor in descriptors {
            let result = self.run_mod(&store, &descriptor, &mut summary);
            if let Err(err) = result {
                tracing::warn!("Skipping mod {}: {}", descriptor.display(), err);
                summary.skipped_mods += 1;
            }
        }

        store.finish()?;
        tracing::info!(
            "Done: {} mod(s), {} created, {} merged, {} unchanged, {} migrated, {} failed",
            summary.mods,
            summary.created,
            summary.merged,
            summary.unchanged,
            summary.migrated,
            summary.failed
        );
        Ok(summary)
    }

    fn run_mod(&mut self, store: &FileStore, descriptor: &Path, summary: &mut RunSummary) -> Result<()> {
        let text = store::load_text(descriptor)?;
        let descriptor = ModDescriptor::from_text(&text, descriptor)?;
        if descriptor.path == store.target_dir() {
            tracing::debug!("Skipping the target mod itself: {}", descriptor.name);
            return Ok(());
        }

        tracing::info!("Mod: {} ({})", descriptor.name, descriptor.path.display());
        let root = if descriptor.is_archive() {
            store.stage_archive(&descriptor.path)?
        } else {
            descriptor.path.clone()
        };

        let walked = store::walk_files(&root);
        if let Ok(files) = &walked {
            for file in files {
                if let Err(err) = self.run_file(store, &descriptor.name, &root, file, summary) {
                    tracing::warn!("Skipping {}: {}", file.display(), err);
                    summary.failed += 1;
                }
            }
        }

        // Staging is cleared even when the walk failed.
        if descriptor.is_archive() {
            store.clear_staging()?;
        }
        walked?;
        summary.mods += 1;
        Ok(())
    }

    fn run_file(
        &mut self,
        store: &FileStore,
        mod_name: &str,
        root: &Path,
        file: &Path,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let Some(mut segments) = store::relative_segments(root, file) else {
            return Ok(());
        };

        match mapping::classify(&segments) {
            FileRule::Skip => return Ok(()),
            FileRule::Migrate => {
                let Some(file_name) = segments.pop() else {
                    return Ok(());
                };
                let destination = store.destination(&segments, &file_name)?;
                if store::copy_if_absent(file, &destination)? {
                    summary.migrated += 1;
                }
                return Ok(());
            }
            FileRule::Merge => {}
        }

        let relative = segments.join("/");
        tracing::info!("Parsing: {}", relative);
        let text = store::load_text(file)?;
        let source = format!("{}:{}", mod_name, relative);
        let Some(candidate) = crate::parse_document(&text, &relative, &source)? else {
            return Ok(());
        };

        let Some(file_name) = segments.pop() else {
            return Ok(());
        };
        let output = mapping::translate(&segments, &file_name, &self.options.target_mod);
        let destination = store.destination(&segments, &output)?;

        match merge::merge_file(&destination, &candidate, &mut self.resolver)? {
            MergeOutcome::Created => summary.created += 1,
            MergeOutcome::Unchanged => summary.unchanged += 1,
            MergeOutcome::Merged { .. } => summary.merged += 1,
        }
        Ok(())
    }
}
