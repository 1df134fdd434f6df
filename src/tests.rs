use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;

use crate::ast::{Group, Term};
use crate::descriptor::ModDescriptor;
use crate::diff::{compare, DifferenceKind};
use crate::error::{Error, Position};
use crate::mapping::{self, FileRule};
use crate::merge::{merge, merge_file, Conflict, KeepMaster, MergeOutcome, PreferCandidate, Resolution};
use crate::multimap::OrderedMultiMap;
use crate::normalize::normalize;
use crate::serialize;
use crate::smoosh::{SmooshOptions, Smoosher};
use crate::store::{self, FileStore};
use crate::tree::{Document, Entry, EntryType};
use crate::value::{Operator, Value};
use crate::{builder, parser};

// ── Shared fixture runners ──────────────────────────────────────────

/// Embed fixture files at compile time.
const PARSE_FIXTURES: &str = include_str!("../test-data/fixtures/parse.json");
const BUILDINGS: &str = include_str!("../test-data/buildings.txt");
const DESCRIPTOR: &str = include_str!("../test-data/descriptor.mod");

fn parse(text: &str, source: &str) -> Document {
    crate::parse_document(text, "test", source)
        .unwrap()
        .expect("text has content")
}

fn top(doc: &Document, key: &str) -> Entry {
    doc.top_level_by_key().get(key)[0]
}

fn find_attribute<'d>(doc: &'d Document, key: &str) -> &'d crate::tree::Attribute {
    doc.walk()
        .into_iter()
        .find_map(|e| match e {
            Entry::Attribute(a) if doc.attribute(a).key == key => Some(doc.attribute(a)),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no attribute '{}'", key))
}

#[test]
fn test_fixture_parse() {
    let fixtures: Vec<serde_json::Value> = serde_json::from_str(PARSE_FIXTURES).unwrap();

    for fixture in &fixtures {
        let name = fixture["name"].as_str().unwrap();
        let input = fixture["input"].as_str().unwrap();
        let expect_errors = fixture
            .get("expectErrors")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let expect_empty = fixture
            .get("expectEmpty")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let result = crate::parse_document(input, name, "");
        if expect_errors {
            assert!(
                matches!(result, Err(Error::MalformedSource { .. })),
                "Fixture '{}': expected a syntax error, got {:?}",
                name,
                result
            );
            continue;
        }

        let doc = result.unwrap_or_else(|e| panic!("Fixture '{}': unexpected error: {}", name, e));
        if expect_empty {
            assert!(doc.is_none(), "Fixture '{}': expected no content", name);
            continue;
        }

        let doc = doc.unwrap_or_else(|| panic!("Fixture '{}': no content", name));
        let text = serialize::to_text(&doc);
        assert_eq!(
            text,
            fixture["expected"].as_str().unwrap(),
            "Fixture '{}': canonical text mismatch",
            name
        );

        // Canonical text parses back to the same tree.
        let reparsed = crate::parse_document(&text, name, "").unwrap().unwrap();
        assert!(doc.content_eq(&reparsed), "Fixture '{}': round trip changed the tree", name);
    }
}

// ── Value lexicon ───────────────────────────────────────────────────

#[test]
fn test_numeric_classification() {
    assert_eq!(Value::classify("10"), Value::Integer(10));
    assert_eq!(Value::classify("10.0"), Value::Real(10.0));
    assert_eq!(Value::classify("10."), Value::Real(10.0));
    assert_eq!(Value::classify("-3"), Value::Integer(-3));
    assert_eq!(Value::classify("+7"), Value::Integer(7));
    assert_eq!(Value::classify("-0.25"), Value::Real(-0.25));
}

#[test]
fn test_boolean_classification() {
    assert_eq!(Value::classify("yes"), Value::Boolean(true));
    assert_eq!(Value::classify("No"), Value::Boolean(false));
    assert_eq!(Value::classify("YES"), Value::Boolean(true));
    assert_eq!(Value::classify("yesterday"), Value::Unquoted("yesterday".into()));
}

#[test]
fn test_unrecognized_tokens_stay_verbatim() {
    for token in ["1.2.3", ".5", "-", "event.10", "@cost", "owner:capital", "99999999999999999999"] {
        assert_eq!(Value::classify(token), Value::Unquoted(token.to_string()), "token {}", token);
    }
}

#[test]
fn test_value_display() {
    assert_eq!(Value::Real(10.0).to_string(), "10.0");
    assert_eq!(Value::Real(2.5).to_string(), "2.5");
    assert_eq!(Value::Boolean(true).to_string(), "yes");
    assert_eq!(Value::Boolean(false).to_string(), "no");
    assert_eq!(Value::Quoted("a b".into()).to_string(), "\"a b\"");
    assert_eq!(Value::Integer(-4).to_string(), "-4");
}

#[test]
fn test_boolean_fidelity() {
    let doc = parse("flag = yes\nother = no", "");
    assert_eq!(find_attribute(&doc, "flag").operand.as_ref().unwrap().value, Value::Boolean(true));
    assert_eq!(find_attribute(&doc, "other").operand.as_ref().unwrap().value, Value::Boolean(false));
    assert_eq!(serialize::to_text(&doc), "flag = yes\nother = no\n");
}

// ── Normalizer ──────────────────────────────────────────────────────

#[test]
fn test_normalize_strips_comments() {
    assert_eq!(normalize("a = 1 # note").as_deref(), Some("a = 1"));
    assert_eq!(normalize("# only a comment\n"), None);
    assert_eq!(normalize("\n\t \n"), None);
}

#[test]
fn test_normalize_keeps_origin() {
    assert_eq!(
        normalize("a = 1 #ORIGIN = some_mod").as_deref(),
        Some("a = 1 #ORIGIN = some_mod")
    );
}

#[test]
fn test_normalize_shorthands() {
    assert_eq!(normalize("limit{a=1}").as_deref(), Some("limit={a=1}"));
    assert_eq!(normalize("\"k\" = 1").as_deref(), Some("k= 1"));
    assert_eq!(normalize("a = \n{ b = 1 }").as_deref(), Some("a ={ b = 1 }"));
}

#[test]
fn test_normalize_leaves_quoted_text_alone() {
    assert_eq!(
        normalize("desc = \"Lab{1}\"\nnote = \"a =  {b}\"").as_deref(),
        Some("desc = \"Lab{1}\"\nnote = \"a =  {b}\"")
    );
    assert_eq!(normalize("\"k\"{").as_deref(), Some("\"k\"{"));
    assert_eq!(
        normalize("t = \"x\" limit{ \"y\" = 1 }").as_deref(),
        Some("t = \"x\" limit={ y= 1 }")
    );
}

#[test]
fn test_normalize_drops_descriptor_lists() {
    let text = normalize("tags={\"x\"}\nname = a\ndependencies={\"y\" \"z\"}\n").unwrap();
    assert!(!text.contains("tags"));
    assert!(!text.contains("dependencies"));
    assert!(text.contains("name = a"));
}

// ── Grammar errors ──────────────────────────────────────────────────

#[test]
fn test_error_unclosed_block() {
    let err = parser::parse("a ={ b = 1").unwrap_err();
    assert_eq!(err.expected, "'}'");
    assert_eq!(err.found, "end of input");
    assert_eq!(err.begin.offset, 3);
    assert!(err.begin.offset < err.end.offset);
    assert_eq!(err.to_string(), "0:3-0:10: Expected '}', found end of input (offset 3)");
}

#[test]
fn test_error_on_second_line() {
    let err = parser::parse("valid = 1\ninvalid = ").unwrap_err();
    assert_eq!(err.begin.line, 1);
    assert_eq!(err.expected, "value");
}

#[test]
fn test_error_query_at_top_level() {
    let err = parser::parse("a > 1").unwrap_err();
    assert_eq!(err.found, "query operator '>'");
    assert_eq!(err.begin.offset, 0);
}

#[test]
fn test_error_unclosed_string_stays_on_line() {
    let err = parser::parse("x=\"unterminated\ny = 2").unwrap_err();
    assert_eq!(err.begin.line, 0);
    assert_eq!(err.end.line, 0);
    assert!(err.begin.offset < err.end.offset);
}

#[test]
fn test_malformed_source_names_file() {
    let err = crate::parse_document("a = {", "broken.txt", "").unwrap_err();
    match err {
        Error::MalformedSource { file, error } => {
            assert_eq!(file, "broken.txt");
            assert_eq!(error.expected, "'}'");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_quoted_strings_are_opaque() {
    let groups = parser::parse(r#"a = "say \"hi\"""#).unwrap();
    match groups[0].terms.as_slice() {
        [Term::Key(key), Term::Operator(Operator::Assign), Term::Value(Value::Quoted(s))] => {
            assert_eq!(key, "a");
            assert_eq!(s, r#"say \"hi\""#);
        }
        other => panic!("unexpected terms: {:?}", other),
    }
}

// ── Tree model ──────────────────────────────────────────────────────

#[test]
fn test_sample_parses() {
    let doc = parse(BUILDINGS, "modA:common/buildings/labs.txt");
    let keys: Vec<&str> = doc.entries().iter().map(|e| doc.key_of(*e)).collect();
    assert_eq!(
        keys,
        ["@cost", "building_research_lab_4", "building_strange_key", "building_research_lab_4"]
    );
    assert_eq!(
        find_attribute(&doc, "icon").operand.as_ref().unwrap().value,
        Value::Quoted("building_research_lab_4".into())
    );
    assert_eq!(
        find_attribute(&doc, "can_be_ruined").operand.as_ref().unwrap().value,
        Value::Boolean(false)
    );
    assert_eq!(
        find_attribute(&doc, "rare_crystals").operand.as_ref().unwrap().value,
        Value::Real(2.5)
    );
    let query = find_attribute(&doc, "num_pops");
    assert!(query.is_query());
    assert_eq!(query.operand.as_ref().unwrap().op, Operator::GreaterOrEqual);
    assert!(find_attribute(&doc, "building_research_lab_5").is_statement());
}

#[test]
fn test_sample_round_trip() {
    let doc = parse(BUILDINGS, "modA:common/buildings/labs.txt");
    let text = serialize::to_text(&doc);
    let reparsed = parse(&text, "elsewhere");

    assert!(doc.content_eq(&reparsed));
    // Annotations carry the provenance through text.
    for (a, b) in doc.walk().into_iter().zip(reparsed.walk()) {
        assert_eq!(doc.source_of(a), reparsed.source_of(b));
    }
    assert_eq!(serialize::to_text(&reparsed), text);
}

#[test]
fn test_duplicate_keys_preserved() {
    let doc = parse("a = { x = 1 }\nb = 2\na = { y = 2 }", "");
    let by_key = doc.top_level_by_key();
    let both = by_key.get("a");
    assert_eq!(both.len(), 2);
    assert_eq!(doc.leaves(match both[0] {
        Entry::Node(n) => n,
        _ => panic!("expected a block"),
    }).len(), 1);
    assert_eq!(serialize::to_text(&doc), "a = {\n    x = 1\n}\nb = 2\na = {\n    y = 2\n}\n");
}

#[test]
fn test_empty_block() {
    let doc = parse("key={}", "");
    match top(&doc, "key") {
        Entry::Node(n) => {
            assert!(doc.node(n).entries().is_empty());
            assert!(!doc.node(n).is_branch_point());
        }
        Entry::Attribute(_) => panic!("expected a block"),
    }
    assert_eq!(serialize::to_text(&doc), "key = {}\n");
}

#[test]
fn test_ids_unique_and_assigned_at_construction() {
    let doc = parse(BUILDINGS, "");
    let entries = doc.walk();
    let ids: HashSet<_> = entries.iter().map(|e| doc.entity_id(*e)).collect();
    assert_eq!(ids.len(), entries.len());
    assert_eq!(doc.id(), 0);
    assert!(!ids.contains(&0));
    // Asking twice gives the same answer.
    for entry in &entries {
        assert_eq!(doc.entity_id(*entry), doc.entity_id(*entry));
        assert_eq!(doc.find(doc.entity_id(*entry)), Some(*entry));
    }
}

#[test]
fn test_parent_links() {
    let doc = parse(BUILDINGS, "");
    for entry in doc.walk() {
        let parent = doc.parent_of(entry).expect("every entry has a parent");
        assert!(doc.node(parent).entries().contains(&entry));
    }
    assert_eq!(doc.root().parent(), None);
}

#[test]
fn test_branch_path() {
    let doc = parse("a = { b = { c = 1 } }", "");
    let c = doc.walk().into_iter().find(|e| doc.key_of(*e) == "c").unwrap();
    assert_eq!(doc.branch_path(c), ["a", "b"]);
    assert_eq!(doc.top_level_entry(c), top(&doc, "a"));
    assert!(doc.branch_path(top(&doc, "a")).is_empty());
}

#[test]
fn test_branch_points() {
    let doc = parse("outer = { inner = { a = 1 } b = 2 }", "");
    assert!(doc.is_pruned());
    let outer = match top(&doc, "outer") {
        Entry::Node(n) => n,
        _ => panic!("expected a block"),
    };
    let inner = doc.node(outer).children().next().unwrap();
    assert!(doc.node(outer).is_branch_point());
    assert!(!doc.node(inner).is_branch_point());

    let a = doc.leaves(outer)[0];
    assert_eq!(doc.branch_point_successor(Entry::Attribute(a)), doc.node(outer).id);
    assert_eq!(doc.branch_point_successor(Entry::Node(inner)), doc.node(outer).id);
}

#[test]
fn test_branch_point_climb_stops_at_top_level() {
    let doc = parse("w = { x = { y = 1 } }", "");
    let y = doc.walk().into_iter().find(|e| doc.key_of(*e) == "y").unwrap();
    assert_eq!(doc.branch_point_successor(y), doc.entity_id(top(&doc, "w")));
}

#[test]
fn test_sources_sanitized() {
    let doc = parse("a = { b = 1 }", "my mod:some file.txt");
    for entry in doc.walk() {
        assert_eq!(doc.source_of(entry), "my_mod:some_file.txt");
    }
    assert_eq!(doc.source(), "my_mod:some_file.txt");
}

#[test]
fn test_origin_overrides_fallback() {
    let doc = parse("a = 1 #ORIGIN = upstream\nb = 2", "local");
    assert_eq!(doc.source_of(top(&doc, "a")), "upstream");
    assert_eq!(doc.source_of(top(&doc, "b")), "local");
}

#[test]
fn test_entry_types() {
    let doc = parse("a = 1\nb = { x > 2 y }", "");
    assert_eq!(doc.entry_type(top(&doc, "a")), EntryType::Scalar(Operator::Assign));
    assert_eq!(doc.entry_type(top(&doc, "b")), EntryType::Block);
    let y = doc.walk().into_iter().find(|e| doc.key_of(*e) == "y").unwrap();
    assert_eq!(doc.entry_type(y), EntryType::Statement);
    assert_eq!(EntryType::Block.to_string(), "={");
    assert!(EntryType::Scalar(Operator::Assign).same_structure(EntryType::Scalar(Operator::Less)));
    assert!(!EntryType::Scalar(Operator::Assign).same_structure(EntryType::Block));
}

#[test]
fn test_unclassifiable_group_is_structural_violation() {
    let group = Group {
        terms: vec![Term::Key("a".into()), Term::Operator(Operator::Assign)],
        origin: None,
        begin: Position {
            line: 0,
            column: 0,
            offset: 0,
        },
    };
    let err = builder::build(&[group], "hand-made", "").unwrap_err();
    assert!(matches!(err, Error::StructuralViolation { .. }));
}

#[test]
fn test_replace_top_level() {
    let mut doc = parse("a = 1\nb = 2\nb = 3\nc = 4", "left");
    let other = parse("b = 9", "right");
    let max_id = doc.walk().into_iter().map(|e| doc.entity_id(e)).max().unwrap();

    let removed = doc.replace_top_level("b", &other, other.entries());
    assert_eq!(removed, 2);
    assert!(!doc.is_pruned());
    assert_eq!(
        serialize::to_text(&doc),
        "a = 1 #ORIGIN = left\nb = 9 #ORIGIN = right\nc = 4 #ORIGIN = left\n"
    );
    assert!(doc.entity_id(top(&doc, "b")) > max_id);
}

#[test]
fn test_graft_copies_with_fresh_ids() {
    let mut doc = parse("a = 1", "");
    let other = parse("blk = { x = 1 y = { z = 2 } }", "");
    let copy = doc.graft(Document::ROOT, &other, top(&other, "blk"));

    assert!(doc.subtree_eq(copy, &other, top(&other, "blk")));
    assert_eq!(doc.entries().len(), 2);
    let ids: HashSet<_> = doc.walk().into_iter().map(|e| doc.entity_id(e)).collect();
    assert_eq!(ids.len(), doc.walk().len());
}

// ── Multi-map ───────────────────────────────────────────────────────

#[test]
fn test_multimap_keeps_every_value() {
    let mut map = OrderedMultiMap::new();
    map.insert("b", 1);
    map.insert("a", 2);
    map.insert("b", 3);

    assert_eq!(map.get("b").to_vec(), vec![1, 3]);
    assert_eq!(map.keys().copied().collect::<Vec<_>>(), ["b", "a"]);
    assert_eq!(map.key_count(), 2);
    assert_eq!(map.value_count(), 3);
    assert_eq!(map.remove("b"), vec![1, 3]);
    assert!(map.get("b").is_empty());
    assert!(!map.is_empty());
}

// ── Serializer ──────────────────────────────────────────────────────

#[test]
fn test_serializer_format() {
    let doc = parse("a = { b = 1 c < 2 d }", "src file");
    assert_eq!(
        serialize::to_text(&doc),
        "a = {\n    b = 1 #ORIGIN = src_file\n    c < 2 #ORIGIN = src_file\n    d #ORIGIN = src_file\n} #ORIGIN = src_file\n"
    );
}

#[test]
fn test_mapping_groups_by_key() {
    let doc = parse("a = 1\nb = 2\na = 3", "");
    assert_eq!(serialize::mapping_to_text(&doc, &doc.top_level_by_key()), "a = 1\na = 3\nb = 2\n");
    assert_eq!(serialize::entries_to_text(&doc, &[top(&doc, "b")]), "b = 2\n");
}

#[test]
fn test_write_to_matches_text() {
    let doc = parse(BUILDINGS, "x");
    let mut out = Vec::new();
    serialize::write_to(&doc, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), serialize::to_text(&doc));
}

// ── Differ ──────────────────────────────────────────────────────────

#[test]
fn test_diff_identical_is_empty() {
    let left = parse(BUILDINGS, "left");
    let right = parse(BUILDINGS, "right");
    let record = compare(&left, &right);
    assert_eq!(record.conflict_count(), 0);
    assert!(record.is_empty());
}

#[test]
fn test_diff_top_level_addition_and_deletion() {
    let record = compare(&parse("a = 1\nb = 2", ""), &parse("a = 1\nc = 3", ""));
    assert_eq!(record.count(DifferenceKind::Deletion), 1);
    assert_eq!(record.count(DifferenceKind::Addition), 1);
    assert_eq!(record.count(DifferenceKind::Change), 0);
    assert_eq!(record.conflicting_root_keys(), ["b", "c"]);
}

#[test]
fn test_diff_leaf_addition_and_deletion() {
    let record = compare(&parse("root = { a = 1 b = 2 }", ""), &parse("root = { a = 1 c = 3 }", ""));
    let kinds: Vec<(DifferenceKind, &str)> = record
        .differences()
        .iter()
        .map(|d| (d.kind, d.key.as_str()))
        .collect();
    assert_eq!(kinds, [(DifferenceKind::Deletion, "b"), (DifferenceKind::Addition, "c")]);
}

#[test]
fn test_diff_change_references_both_sides() {
    let record = compare(&parse("a = 1", "left"), &parse("a = 2", "right"));
    assert_eq!(record.differences().len(), 1);
    let change = &record.differences()[0];
    assert_eq!(change.kind, DifferenceKind::Change);
    assert_eq!(change.original.as_ref().unwrap().source, "left");
    assert_eq!(change.candidate.as_ref().unwrap().source, "right");
    assert_eq!(change.candidate.as_ref().unwrap().value.as_deref(), Some("= 2"));
    assert_eq!(record.original_changes().key_count(), 1);
    assert_eq!(record.candidate_changes().key_count(), 1);
}

#[test]
fn test_diff_localizes_to_branch_point() {
    let left = parse("outer = { inner = { a = 1 } b = 2 }", "");
    let right = parse("outer = { inner = { a = 5 } b = 2 }", "");
    let record = compare(&left, &right);

    assert_eq!(record.differences().len(), 1);
    let change = &record.differences()[0];
    let outer_id = left.entity_id(top(&left, "outer"));
    let inner_id = match top(&left, "outer") {
        Entry::Node(n) => left.node(left.node(n).children().next().unwrap()).id,
        _ => panic!("expected a block"),
    };
    assert_eq!(change.original.as_ref().unwrap().branch_point, outer_id);
    assert!(record.original_changes().contains_key(&outer_id));
    assert!(!record.original_changes().contains_key(&inner_id));
    assert_eq!(
        change.candidate.as_ref().unwrap().branch_point,
        right.entity_id(top(&right, "outer"))
    );
}

#[test]
fn test_diff_moved_leaf_is_one_change() {
    let record = compare(&parse("r = { x = { k = 1 } }", ""), &parse("r = { y = { k = 1 } }", ""));
    assert_eq!(record.differences().len(), 1);
    assert_eq!(record.count(DifferenceKind::Change), 1);
    assert_eq!(record.count(DifferenceKind::Deletion), 0);
    let change = &record.differences()[0];
    assert_eq!(change.original.as_ref().unwrap().path, ["r", "x"]);
    assert_eq!(change.candidate.as_ref().unwrap().path, ["r", "y"]);
}

#[test]
fn test_diff_ambiguous_move_is_deletion() {
    let record = compare(
        &parse("r = { x = { k = 1 } }", ""),
        &parse("r = { y = { k = 1 } z = { k = 2 } }", ""),
    );
    assert_eq!(record.count(DifferenceKind::Deletion), 1);
    assert_eq!(record.count(DifferenceKind::Addition), 2);
    assert_eq!(record.count(DifferenceKind::Change), 0);
}

#[test]
fn test_diff_exact_path_wins_over_move() {
    let record = compare(
        &parse("r = { x = { k = 1 } y = { k = 2 } }", ""),
        &parse("r = { x = { k = 1 } y = { k = 3 } }", ""),
    );
    assert_eq!(record.differences().len(), 1);
    assert_eq!(record.differences()[0].original.as_ref().unwrap().path, ["r", "y"]);
}

#[test]
fn test_diff_structure_only_change() {
    let record = compare(&parse("r = { a = 1 }", ""), &parse("r = { a = 1 e = {} }", ""));
    assert_eq!(record.differences().len(), 1);
    assert_eq!(record.differences()[0].kind, DifferenceKind::Change);
    assert_eq!(record.differences()[0].key, "r");
}

#[test]
fn test_diff_duplicate_blocks_pair_positionally() {
    let twice = "e = { a = 1 }\ne = { a = 2 }";
    assert_eq!(compare(&parse(twice, ""), &parse(twice, "")).conflict_count(), 0);

    let record = compare(&parse(twice, ""), &parse("e = { a = 1 }", ""));
    assert_eq!(record.differences().len(), 1);
    let deletion = &record.differences()[0];
    assert_eq!(deletion.kind, DifferenceKind::Deletion);
    assert!(matches!(deletion.original.as_ref().unwrap().entry, Entry::Node(_)));
}

#[test]
fn test_diff_conflict_count_counts_branch_points() {
    let record = compare(&parse("a = 1\nb = 2", ""), &parse("a = 3\nb = 4", ""));
    assert_eq!(record.count(DifferenceKind::Change), 2);
    assert_eq!(record.conflict_count(), 4);

    // Two changes under one branch point count once per tree.
    let record = compare(&parse("r = { a = 1 b = 2 }", ""), &parse("r = { a = 3 b = 4 }", ""));
    assert_eq!(record.count(DifferenceKind::Change), 2);
    assert_eq!(record.conflict_count(), 2);
}

#[test]
fn test_diff_record_json() {
    let record = compare(&parse("a = 1", "left"), &parse("a = 2", "right"));
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["differences"][0]["kind"], "change");
    assert_eq!(json["differences"][0]["original"]["source"], "left");
    assert!(json["original_changes"].is_object());
}

// ── Merge ───────────────────────────────────────────────────────────

#[test]
fn test_merge_without_master_writes_candidate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    let candidate = parse(BUILDINGS, "modA:labs.txt");

    let outcome = merge_file(&path, &candidate, &mut KeepMaster).unwrap();
    assert_eq!(outcome, MergeOutcome::Created);
    assert_eq!(fs::read_to_string(&path).unwrap(), serialize::to_text(&candidate));
}

#[test]
fn test_merge_identical_leaves_master() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    merge_file(&path, &parse(BUILDINGS, "modA"), &mut KeepMaster).unwrap();
    let before = fs::read_to_string(&path).unwrap();

    let outcome = merge_file(&path, &parse(BUILDINGS, "modB"), &mut PreferCandidate).unwrap();
    assert_eq!(outcome, MergeOutcome::Unchanged);
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn test_merge_prefer_candidate() {
    let mut master = parse("a = 1\nb = { x = 1 }", "left");
    let candidate = parse("a = 2\nb = { x = 1 }", "right");

    let outcome = merge(&mut master, &candidate, &mut PreferCandidate).unwrap();
    assert_eq!(outcome, MergeOutcome::Merged { resolved: 1, carried: 0 });
    assert_eq!(
        serialize::to_text(&master),
        "a = 2 #ORIGIN = right\nb = {\n    x = 1 #ORIGIN = left\n} #ORIGIN = left\n"
    );
}

#[test]
fn test_merge_keep_master() {
    let mut master = parse("a = 1", "left");
    let before = serialize::to_text(&master);
    let outcome = merge(&mut master, &parse("a = 2", "right"), &mut KeepMaster).unwrap();
    assert_eq!(outcome, MergeOutcome::Merged { resolved: 1, carried: 0 });
    assert_eq!(serialize::to_text(&master), before);
}

#[test]
fn test_merge_carries_one_sided_keys() {
    let mut master = parse("a = 1\nold = 5", "left");
    let candidate = parse("a = 1\nc = { d = 2 }", "right");

    let outcome = merge(&mut master, &candidate, &mut KeepMaster).unwrap();
    assert_eq!(outcome, MergeOutcome::Merged { resolved: 0, carried: 2 });
    assert_eq!(
        serialize::to_text(&master),
        "a = 1 #ORIGIN = left\nold = 5 #ORIGIN = left\nc = {\n    d = 2 #ORIGIN = right\n} #ORIGIN = right\n"
    );
}

#[test]
fn test_merge_custom_resolution() {
    let mut master = parse("a = 1\nb = 2\nc = 3", "left");
    let candidate = parse("a = 1\nb = 5\nc = 3", "right");
    let mut seen = Vec::new();
    let mut resolver = |conflict: &Conflict| -> crate::error::Result<Resolution> {
        seen.push((
            conflict.key.clone(),
            conflict.original.text.clone(),
            conflict.candidate.text.clone(),
        ));
        Ok(Resolution::Custom("b = 9".to_string()))
    };

    let outcome = merge(&mut master, &candidate, &mut resolver).unwrap();
    assert_eq!(outcome, MergeOutcome::Merged { resolved: 1, carried: 0 });
    assert_eq!(
        seen,
        [(
            "b".to_string(),
            "b = 2 #ORIGIN = left\n".to_string(),
            "b = 5 #ORIGIN = right\n".to_string()
        )]
    );
    assert_eq!(
        serialize::to_text(&master),
        "a = 1 #ORIGIN = left\nb = 9 #ORIGIN = Conflict_resolution_between:_left_and_right\nc = 3 #ORIGIN = left\n"
    );
}

#[test]
fn test_merge_custom_block_with_inline_origin() {
    let mut master = parse("b = { x = 1 }", "left");
    let candidate = parse("b = { x = 2 }", "right");
    let mut resolver = |_: &Conflict| -> crate::error::Result<Resolution> {
        Ok(Resolution::Custom("b = { x = 3 #ORIGIN = mine}".into()))
    };
    merge(&mut master, &candidate, &mut resolver).unwrap();
    assert_eq!(find_attribute(&master, "x").source, "mine");
    assert_eq!(
        find_attribute(&master, "x").operand.as_ref().map(|o| o.value.to_string()),
        Some("3".to_string())
    );
}

#[test]
fn test_merge_custom_with_foreign_key_fails() {
    let mut master = parse("b = 2", "left");
    let mut resolver = |_: &Conflict| -> crate::error::Result<Resolution> { Ok(Resolution::Custom("z = 1".into())) };
    let err = merge(&mut master, &parse("b = 3", "right"), &mut resolver).unwrap_err();
    assert!(matches!(err, Error::StructuralViolation { .. }));
}

#[test]
fn test_merge_empty_custom_removes_key() {
    let mut master = parse("a = 1\nb = 2\nc = 3", "left");
    let mut resolver = |_: &Conflict| -> crate::error::Result<Resolution> { Ok(Resolution::Custom(String::new())) };
    merge(&mut master, &parse("a = 1\nb = 5\nc = 3", "right"), &mut resolver).unwrap();
    assert_eq!(serialize::to_text(&master), "a = 1 #ORIGIN = left\nc = 3 #ORIGIN = left\n");
}

#[test]
fn test_merge_type_mismatch_aborts() {
    let mut master = parse("a = 1", "left");
    let candidate = parse("a = { x = 1 }", "right");
    let mut resolver = |_: &Conflict| -> crate::error::Result<Resolution> {
        panic!("mismatched conflicts must not reach the resolver")
    };
    match merge(&mut master, &candidate, &mut resolver) {
        Err(Error::ConflictTypeMismatch { key, .. }) => assert_eq!(key, "a"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_merge_file_rewrites_master() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    merge_file(&path, &parse("a = { x = 1 y = 2 }", "modA"), &mut KeepMaster).unwrap();

    let outcome = merge_file(&path, &parse("a = { x = 1 y = 3 }", "modB"), &mut PreferCandidate).unwrap();
    assert_eq!(outcome, MergeOutcome::Merged { resolved: 1, carried: 0 });

    let master = parse(&fs::read_to_string(&path).unwrap(), "");
    assert_eq!(find_attribute(&master, "y").operand.as_ref().unwrap().value, Value::Integer(3));
    assert_eq!(find_attribute(&master, "y").source, "modB");
}

// ── File store ──────────────────────────────────────────────────────

fn write(root: &Path, relative: &str, text: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_store_prepares_target() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("merged");
    let store = FileStore::open(dir.path(), &target, false).unwrap();
    assert!(target.is_dir());
    assert!(store.staging_dir().is_dir());
    store.finish().unwrap();
    assert!(!target.join(store::STAGING_DIR).exists());
}

#[test]
fn test_store_refuses_non_empty_target() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("merged");
    write(&target, "leftover.txt", "x = 1");

    let err = FileStore::open(dir.path(), &target, false).unwrap_err();
    assert!(matches!(err, Error::TargetNotEmpty(_)));

    FileStore::open(dir.path(), &target, true).unwrap();
    assert!(!target.join("leftover.txt").exists());
}

#[test]
fn test_store_discovers_descriptors() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "b.mod", "");
    write(dir.path(), "a.mod", "");
    write(dir.path(), "notes.txt", "");
    let store = FileStore::open(dir.path(), dir.path().join("merged"), false).unwrap();

    let found = store.discover_descriptors().unwrap();
    assert_eq!(found, [dir.path().join("a.mod"), dir.path().join("b.mod")]);
}

#[test]
fn test_store_stages_archives() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("packed.zip");
    let mut zip = zip::ZipWriter::new(fs::File::create(&archive).unwrap());
    zip.start_file("common/buildings/x.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"a = 1").unwrap();
    zip.finish().unwrap();

    let store = FileStore::open(dir.path(), dir.path().join("merged"), false).unwrap();
    let root = store.stage_archive(&archive).unwrap();
    let files = store::walk_files(&root).unwrap();
    assert_eq!(files, [root.join("common/buildings/x.txt")]);

    store.clear_staging().unwrap();
    assert!(store::walk_files(&root).unwrap().is_empty());
}

#[test]
fn test_relative_segments() {
    let segments = store::relative_segments(Path::new("/mods/a"), Path::new("/mods/a/common/x.txt"));
    assert_eq!(segments.unwrap(), ["common", "x.txt"]);
    assert_eq!(store::relative_segments(Path::new("/mods/a"), Path::new("/other/x.txt")), None);
}

#[test]
fn test_write_atomic_replaces_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.txt");
    store::write_atomic(&path, "first").unwrap();
    store::write_atomic(&path, "second").unwrap();
    assert_eq!(store::load_text(&path).unwrap(), "second");
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_copy_if_absent() {
    let dir = tempfile::tempdir().unwrap();
    let from = write(dir.path(), "from.dds", "new");
    let to = write(dir.path(), "to.dds", "old");
    assert!(!store::copy_if_absent(&from, &to).unwrap());
    assert_eq!(fs::read_to_string(&to).unwrap(), "old");
    assert!(store::copy_if_absent(&from, &dir.path().join("fresh.dds")).unwrap());
}

// ── Path mapping ────────────────────────────────────────────────────

fn segments(path: &str) -> Vec<String> {
    path.split('/').map(str::to_string).collect()
}

#[test]
fn test_classify_files() {
    assert_eq!(mapping::classify(&segments("README.md")), FileRule::Skip);
    assert_eq!(mapping::classify(&segments("docs/README")), FileRule::Skip);
    assert_eq!(mapping::classify(&segments("descriptor.mod")), FileRule::Skip);
    assert_eq!(mapping::classify(&segments("mod description.txt")), FileRule::Skip);
    assert_eq!(mapping::classify(&segments(".gitignore")), FileRule::Skip);
    assert_eq!(mapping::classify(&segments(".git/config")), FileRule::Skip);
    assert_eq!(mapping::classify(&segments("thumbnail.png")), FileRule::Skip);
    assert_eq!(mapping::classify(&segments("gfx/icons/lab.dds")), FileRule::Migrate);
    assert_eq!(mapping::classify(&segments("localisation/labs_l_english.yml")), FileRule::Migrate);
    assert_eq!(mapping::classify(&segments("interface/labs.GFX")), FileRule::Migrate);
    assert_eq!(mapping::classify(&segments("common/buildings/labs.txt")), FileRule::Merge);
}

#[test]
fn test_translate_output_names() {
    let t = |dir: &str, file: &str| mapping::translate(&segments(dir), file, "merged");
    assert_eq!(t("common/buildings", "labs.txt"), "merged_buildings.txt");
    assert_eq!(t("common/pop_jobs", "jobs.txt"), "merged_jobs.txt");
    assert_eq!(t("common/technology", "tech.txt"), "merged_tech.txt");
    assert_eq!(t("common/buildings", "00_buildings.txt"), "00_buildings.txt");
    assert_eq!(t("common/districts", "02_rural_districts.txt"), "02_rural_districts.txt");
    assert_eq!(t("events", "my_events.txt"), "my_events.txt");
    assert_eq!(t("common/graphical_culture", "gc.txt"), "gc.txt");
}

// ── Mod descriptors ─────────────────────────────────────────────────

#[test]
fn test_descriptor_fields() {
    let descriptor = ModDescriptor::from_text(DESCRIPTOR, Path::new("/games/stellaris/mod/labs.mod")).unwrap();
    assert_eq!(descriptor.name, "Sample Research Labs");
    assert_eq!(descriptor.path, PathBuf::from("/games/stellaris/mod/sample_labs"));
    assert!(!descriptor.is_archive());
}

#[test]
fn test_descriptor_archive_wins() {
    let text = "name=\"Packed\"\npath=\"mod/packed\"\narchive=\"/downloads/packed.zip\"\n";
    let descriptor = ModDescriptor::from_text(text, Path::new("/games/mod/packed.mod")).unwrap();
    assert_eq!(descriptor.path, PathBuf::from("/downloads/packed.zip"));
    assert!(descriptor.is_archive());
}

#[test]
fn test_descriptor_missing_path() {
    let err = ModDescriptor::from_text("name=\"Nameless path\"\n", Path::new("x.mod")).unwrap_err();
    assert!(matches!(err, Error::MalformedDescriptor { .. }));
    let err = ModDescriptor::from_text("# nothing\n", Path::new("x.mod")).unwrap_err();
    assert!(matches!(err, Error::MalformedDescriptor { .. }));
}

// ── Batch driver ────────────────────────────────────────────────────

#[test]
fn test_smoosher_merges_mods_into_target() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "modA/common/buildings/a_buildings.txt", "building_x = { cost = 10 }\n");
    write(root, "modA/events/a_events.txt", "namespace = a\n");
    write(root, "modA/gfx/icon.dds", "DDS");
    write(root, "modA/README.md", "readme");
    write(
        root,
        "modB/common/buildings/b_buildings.txt",
        "building_x = { cost = 20 }\nbuilding_y = { cost = 5 }\n",
    );
    write(root, "a.mod", &format!("name=\"Mod A\"\npath=\"{}\"\n", root.join("modA").display()));
    write(root, "b.mod", &format!("name=\"Mod B\"\npath=\"{}\"\n", root.join("modB").display()));
    write(root, "broken.mod", "name=\"Broken\"\n");

    let options = SmooshOptions {
        source_dir: root.to_path_buf(),
        target_mod: "merged".to_string(),
        clean: false,
    };
    let summary = Smoosher::new(options, PreferCandidate).run().unwrap();

    assert_eq!(summary.mods, 2);
    assert_eq!(summary.skipped_mods, 1);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.merged, 1);
    assert_eq!(summary.migrated, 1);
    assert_eq!(summary.failed, 0);

    let target = root.join("merged");
    let merged = fs::read_to_string(target.join("common/buildings/merged_buildings.txt")).unwrap();
    let doc = parse(&merged, "");
    let keys: Vec<&str> = doc.entries().iter().map(|e| doc.key_of(*e)).collect();
    assert_eq!(keys, ["building_x", "building_y"]);
    assert_eq!(find_attribute(&doc, "cost").operand.as_ref().unwrap().value, Value::Integer(20));
    assert_eq!(find_attribute(&doc, "cost").source, "Mod_B:common/buildings/b_buildings.txt");

    assert!(target.join("events/a_events.txt").is_file());
    assert_eq!(fs::read_to_string(target.join("gfx/icon.dds")).unwrap(), "DDS");
    assert!(!target.join("README.md").exists());
    assert!(!target.join(store::STAGING_DIR).exists());
}

#[test]
fn test_smoosher_skips_broken_files() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "modA/common/buildings/bad.txt", "building_x = { cost = 10\n");
    write(root, "modA/common/buildings/empty.txt", "# comments only\n");
    write(root, "modA/common/edicts/edicts.txt", "edict = { length = 10 }\n");
    write(root, "a.mod", &format!("name=\"Mod A\"\npath=\"{}\"\n", root.join("modA").display()));

    let options = SmooshOptions {
        source_dir: root.to_path_buf(),
        target_mod: "merged".to_string(),
        clean: false,
    };
    let summary = Smoosher::new(options, KeepMaster).run().unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.created, 1);
    assert!(root.join("merged/common/edicts/merged_edicts.txt").is_file());
}
