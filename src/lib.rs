pub mod ast;
pub mod builder;
pub mod descriptor;
pub mod diff;
pub mod error;
pub mod mapping;
pub mod merge;
pub mod multimap;
pub mod normalize;
pub mod parser;
pub mod serialize;
pub mod smoosh;
pub mod store;
pub mod tree;
pub mod value;

use error::{Error, Result};
use tree::Document;

pub use diff::{compare, DiffRecord, Difference, DifferenceKind};
pub use merge::{merge, merge_file, KeepMaster, MergeOutcome, PreferCandidate, Resolution, ResolutionSurface};
pub use smoosh::{RunSummary, SmooshOptions, Smoosher};

// ── Core API ───────────────────────────────────────────────────────

/// Run raw script text through the whole pipeline: normalize, parse,
/// build.
///
/// `name` identifies the text in diagnostics and becomes the document key;
/// `fallback_source` is the provenance of every entity without its own
/// `#ORIGIN` annotation. Returns `Ok(None)` when the text holds nothing
/// but comments and whitespace.
pub fn parse_document(text: &str, name: &str, fallback_source: &str) -> Result<Option<Document>> {
    let Some(normalized) = normalize::normalize(text) else {
        tracing::info!("No content found in: {}", name);
        return Ok(None);
    };

    let groups = parser::parse(&normalized).map_err(|error| Error::MalformedSource {
        file: name.to_string(),
        error,
    })?;

    builder::build(&groups, name, fallback_source).map(Some)
}

#[cfg(test)]
mod tests;
