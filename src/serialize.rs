//! Canonical text output, the inverse of [`crate::parse_document`].

use std::io::{self, Write};
use std::path::Path;

use crate::error::Result;
use crate::multimap::OrderedMultiMap;
use crate::normalize::ORIGIN_MARKER;
use crate::store;
use crate::tree::{Document, Entry};

const INDENT: &str = "    ";

struct ScriptWriter<'d> {
    doc: &'d Document,
    buf: String,
    depth: usize,
}

impl<'d> ScriptWriter<'d> {
    fn new(doc: &'d Document) -> Self {
        ScriptWriter {
            doc,
            buf: String::new(),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.buf.push_str(INDENT);
        }
    }

    /// ` #ORIGIN = <source>` and the line break. Entities without a
    /// provenance label get no annotation.
    fn end_line(&mut self, source: &str) {
        if !source.is_empty() {
            self.buf.push(' ');
            self.buf.push_str(ORIGIN_MARKER);
            self.buf.push_str(source);
        }
        self.buf.push('\n');
    }

    fn write_entry(&mut self, entry: Entry) {
        match entry {
            Entry::Attribute(a) => {
                let attribute = self.doc.attribute(a);
                self.indent();
                self.buf.push_str(&attribute.key);
                if let Some(operand) = &attribute.operand {
                    self.buf.push(' ');
                    self.buf.push_str(operand.op.as_str());
                    self.buf.push(' ');
                    self.buf.push_str(&operand.value.to_string());
                }
                self.end_line(&attribute.source);
            }
            Entry::Node(n) => {
                let node = self.doc.node(n);
                self.indent();
                self.buf.push_str(&node.key);
                if node.entries().is_empty() {
                    self.buf.push_str(" = {}");
                    self.end_line(&node.source);
                    return;
                }
                self.buf.push_str(" = {\n");
                self.depth += 1;
                for child in node.entries() {
                    self.write_entry(*child);
                }
                self.depth -= 1;
                self.indent();
                self.buf.push('}');
                self.end_line(&node.source);
            }
        }
    }

    fn finish(self) -> String {
        self.buf
    }
}

/// Render a whole document.
pub fn to_text(doc: &Document) -> String {
    entries_to_text(doc, doc.entries())
}

/// Render a selection of a document's entries at top level, in the order
/// given.
pub fn entries_to_text(doc: &Document, entries: &[Entry]) -> String {
    let mut writer = ScriptWriter::new(doc);
    for entry in entries {
        writer.write_entry(*entry);
    }
    writer.finish()
}

/// Render a key-grouped view of a document: every entry under the first
/// key, then every entry under the second, and so on.
pub fn mapping_to_text(doc: &Document, mapping: &OrderedMultiMap<String, Entry>) -> String {
    let mut writer = ScriptWriter::new(doc);
    for (_, entries) in mapping.iter() {
        for entry in entries {
            writer.write_entry(*entry);
        }
    }
    writer.finish()
}

pub fn write_to<W: Write>(doc: &Document, mut out: W) -> io::Result<()> {
    out.write_all(to_text(doc).as_bytes())?;
    out.flush()
}

/// Write a document to `path`, replacing any previous content atomically.
pub fn write_file(doc: &Document, path: &Path) -> Result<()> {
    tracing::info!("Creating file: {}", path.display());
    store::write_atomic(path, &to_text(doc))
}
