//! `.mod` descriptor files: where a mod lives and what it is called.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::tree::{Document, Entry};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDescriptor {
    pub name: String,
    /// Directory or `.zip` archive holding the mod's files.
    pub path: PathBuf,
    pub descriptor: PathBuf,
}

impl ModDescriptor {
    /// Parse a descriptor's text.
    ///
    /// `archive` wins over `path` when both are present. Relative paths
    /// are taken relative to the directory above the one holding the
    /// descriptor (the launcher's data directory).
    pub fn from_text(text: &str, descriptor: &Path) -> Result<Self> {
        let file = descriptor.display().to_string();
        let malformed = |reason: &str| Error::MalformedDescriptor {
            file: descriptor.to_path_buf(),
            reason: reason.to_string(),
        };

        let doc = crate::parse_document(text, &file, &file)?.ok_or_else(|| malformed("descriptor is empty"))?;

        let name = field(&doc, "name").unwrap_or_default();
        let path = field(&doc, "archive")
            .or_else(|| field(&doc, "path"))
            .unwrap_or_default();
        if name.is_empty() {
            return Err(malformed("missing name"));
        }
        if path.is_empty() {
            return Err(malformed("missing path"));
        }

        let mut resolved = PathBuf::from(&path);
        if resolved.is_relative() {
            if let Some(base) = descriptor.parent().and_then(Path::parent) {
                resolved = base.join(resolved);
            }
        }

        Ok(ModDescriptor {
            name,
            path: resolved,
            descriptor: descriptor.to_path_buf(),
        })
    }

    pub fn is_archive(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
    }
}

/// First top-level scalar under `key`, with any double quotes removed.
fn field(doc: &Document, key: &str) -> Option<String> {
    doc.entries().iter().find_map(|entry| match entry {
        Entry::Attribute(a) if doc.attribute(*a).key == key => {
            let operand = doc.attribute(*a).operand.as_ref()?;
            let text = match &operand.value {
                Value::Quoted(s) | Value::Unquoted(s) => s.clone(),
                other => other.to_string(),
            };
            Some(text.replace('"', "").trim().to_string())
        }
        _ => None,
    })
}
