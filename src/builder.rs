use crate::ast::{Group, Term};
use crate::error::{Error, Result};
use crate::tree::{Document, Entry, NodeRef, Operand};
use crate::value::Operator;

/// Build a [`Document`] from parsed groups, in document order.
///
/// Entities without an `#ORIGIN` annotation take `fallback_source`. The
/// finished document is pruned, so branch-point lookups are cached.
pub fn build(groups: &[Group], name: &str, fallback_source: &str) -> Result<Document> {
    let mut document = Document::new(name, fallback_source);
    build_into(&mut document, Document::ROOT, groups, fallback_source)?;
    document.prune();
    Ok(document)
}

fn build_into(
    document: &mut Document,
    parent: NodeRef,
    groups: &[Group],
    fallback_source: &str,
) -> Result<()> {
    for group in groups {
        build_group(document, parent, group, fallback_source)?;
    }
    Ok(())
}

/// Classify one group by shape and append it under `parent`. Duplicate
/// keys are appended like any other entry.
fn build_group(
    document: &mut Document,
    parent: NodeRef,
    group: &Group,
    fallback_source: &str,
) -> Result<Entry> {
    let source = group.origin.as_deref().unwrap_or(fallback_source);

    match group.terms.as_slice() {
        // Bare word: a flag-like statement with no operator or value.
        [Term::Value(value)] => {
            let key = value.to_string();
            Ok(Entry::Attribute(document.add_attribute(parent, &key, None, source)))
        }
        [Term::Key(key), Term::Operator(Operator::Assign), Term::Nested(body)] => {
            let node = document.add_node(parent, key, source);
            build_into(document, node, body, fallback_source)?;
            Ok(Entry::Node(node))
        }
        [Term::Key(key), Term::Operator(op), Term::Value(value)] => {
            let operand = Operand {
                op: *op,
                value: value.clone(),
            };
            Ok(Entry::Attribute(document.add_attribute(parent, key, Some(operand), source)))
        }
        _ => Err(Error::structural(
            format!("{} line {}", document.name(), group.begin.line + 1),
            format!(
                "cannot classify a group of {} terms as attribute, block or statement",
                group.arity()
            ),
        )),
    }
}
