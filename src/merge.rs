//! Per-file merge of a freshly parsed candidate into the master document.

use std::path::Path;

use crate::diff;
use crate::error::{Error, Result};
use crate::serialize;
use crate::store;
use crate::tree::{Document, Entry, EntryType};

/// What the resolution surface decided for one conflicting key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    UseOriginal,
    UseCandidate,
    /// Hand-edited text holding the entries to keep under the key. Empty
    /// text removes the key.
    Custom(String),
}

/// One side of a conflict as shown to whoever resolves it.
#[derive(Debug, Clone)]
pub struct ConflictSide {
    pub text: String,
    pub entry_type: EntryType,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct Conflict {
    pub key: String,
    pub original: ConflictSide,
    pub candidate: ConflictSide,
}

impl Conflict {
    /// Provenance given to hand-edited resolutions.
    pub fn resolution_source(&self) -> String {
        format!(
            "Conflict resolution between: {} and {}",
            self.original.source, self.candidate.source
        )
    }
}

/// Blocking request/response boundary to whatever arbitrates conflicts.
pub trait ResolutionSurface {
    fn resolve(&mut self, conflict: &Conflict) -> Result<Resolution>;
}

impl<F> ResolutionSurface for F
where
    F: FnMut(&Conflict) -> Result<Resolution>,
{
    fn resolve(&mut self, conflict: &Conflict) -> Result<Resolution> {
        self(conflict)
    }
}

/// Always keep what is already in the master.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepMaster;

impl ResolutionSurface for KeepMaster {
    fn resolve(&mut self, _conflict: &Conflict) -> Result<Resolution> {
        Ok(Resolution::UseOriginal)
    }
}

/// Always take the newcomer's version.
#[derive(Debug, Clone, Copy, Default)]
pub struct PreferCandidate;

impl ResolutionSurface for PreferCandidate {
    fn resolve(&mut self, _conflict: &Conflict) -> Result<Resolution> {
        Ok(Resolution::UseCandidate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No master existed; the candidate became the master.
    Created,
    /// The trees agree; the master was left untouched.
    Unchanged,
    Merged {
        /// Keys sent to the resolution surface.
        resolved: usize,
        /// Keys present on one side only, taken over without asking.
        carried: usize,
    },
}

/// Merge `candidate` into `master` in place.
///
/// Keys the diff flags are arbitrated one at a time. A key present on only
/// one side needs no arbitration: a master-only key stays, a
/// candidate-only key is appended. Whatever is chosen replaces every
/// master entry under the key, at the position of the first.
pub fn merge(master: &mut Document, candidate: &Document, resolver: &mut dyn ResolutionSurface) -> Result<MergeOutcome> {
    let record = diff::compare(master, candidate);
    if record.conflict_count() == 0 {
        return Ok(MergeOutcome::Unchanged);
    }
    tracing::info!("Merging '{}': {}", candidate.name(), record.summary());

    let keys: Vec<String> = record.conflicting_root_keys().into_iter().map(str::to_string).collect();
    let mut resolved = 0;
    let mut carried = 0;

    for key in keys {
        let ours = master.top_level_by_key().get(key.as_str()).to_vec();
        let theirs = candidate.top_level_by_key().get(key.as_str()).to_vec();

        match (ours.first(), theirs.first()) {
            (_, None) => {
                carried += 1;
                continue;
            }
            (None, Some(_)) => {
                master.replace_top_level(&key, candidate, &theirs);
                carried += 1;
                continue;
            }
            (Some(_), Some(_)) => {}
        }

        let conflict = conflict_for(&key, master, &ours, candidate, &theirs)?;
        match resolver.resolve(&conflict)? {
            Resolution::UseOriginal => {}
            Resolution::UseCandidate => {
                master.replace_top_level(&key, candidate, &theirs);
            }
            Resolution::Custom(text) => {
                let source = conflict.resolution_source();
                match crate::parse_document(&text, "Conflict Resolution", &source)? {
                    Some(resolution) => splice_custom(master, &key, resolution, &source)?,
                    None => {
                        master.replace_top_level(&key, candidate, &[]);
                    }
                }
            }
        }
        resolved += 1;
    }

    Ok(MergeOutcome::Merged { resolved, carried })
}

/// Render both sides of a key for the resolution surface. Both sides must
/// be the same kind of entry.
fn conflict_for(
    key: &str,
    master: &Document,
    ours: &[Entry],
    candidate: &Document,
    theirs: &[Entry],
) -> Result<Conflict> {
    let side = |doc: &Document, entries: &[Entry]| ConflictSide {
        text: serialize::entries_to_text(doc, entries),
        entry_type: doc.entry_type(entries[0]),
        source: doc.source_of(entries[0]).to_string(),
    };
    let original = side(master, ours);
    let candidate = side(candidate, theirs);

    if !original.entry_type.same_structure(candidate.entry_type) {
        return Err(Error::ConflictTypeMismatch {
            key: key.to_string(),
            original: original.entry_type.to_string(),
            candidate: candidate.entry_type.to_string(),
        });
    }

    Ok(Conflict {
        key: key.to_string(),
        original,
        candidate,
    })
}

/// Splice a parsed custom resolution in under `key`. Every top-level entry
/// of the resolution must carry the conflict key.
fn splice_custom(master: &mut Document, key: &str, mut resolution: Document, source: &str) -> Result<()> {
    let entries = resolution.entries().to_vec();
    if let Some(stray) = entries.iter().find(|e| resolution.key_of(**e) != key) {
        return Err(Error::structural(
            format!("resolution of '{}'", key),
            format!("resolved text defines '{}'", resolution.key_of(*stray)),
        ));
    }
    for entry in &entries {
        resolution.set_source(*entry, source);
    }
    master.replace_top_level(key, &resolution, &entries);
    Ok(())
}

/// Materialize `candidate` at `path`, merging into whatever master is
/// already there.
pub fn merge_file(path: &Path, candidate: &Document, resolver: &mut dyn ResolutionSurface) -> Result<MergeOutcome> {
    if !path.exists() {
        serialize::write_file(candidate, path)?;
        return Ok(MergeOutcome::Created);
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let text = store::load_text(path)?;
    let Some(mut master) = crate::parse_document(&text, &name, &name)? else {
        serialize::write_file(candidate, path)?;
        return Ok(MergeOutcome::Created);
    };

    let outcome = merge(&mut master, candidate, resolver).inspect_err(|err| {
        tracing::error!("Merge into {} aborted: {}", path.display(), err);
    })?;
    if let MergeOutcome::Merged { .. } = outcome {
        serialize::write_file(&master, path)?;
    }
    Ok(outcome)
}
