//! Which files take part in a merge, and where their output goes.

use std::sync::OnceLock;

use regex::RegexSet;

/// How a file found inside a mod is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRule {
    /// Descriptors, readmes, VCS metadata, thumbnails.
    Skip,
    /// Assets and localisation: copied as-is, never parsed.
    Migrate,
    /// Script: parsed and merged.
    Merge,
}

fn skip_rules() -> &'static RegexSet {
    static RULES: OnceLock<RegexSet> = OnceLock::new();
    RULES.get_or_init(|| {
        RegexSet::new([
            r"\.mod$",
            r"(?:^|/)README[^/]*$",
            r"(?:^|/)mod description\.txt$",
            r"(?:^|/)\.gitignore$",
            r"(?:^|/)\.git/",
            r"(?:^|/)thumbnail\.[^/]*$",
        ])
        .expect("skip patterns")
    })
}

fn migrate_rules() -> &'static RegexSet {
    static RULES: OnceLock<RegexSet> = OnceLock::new();
    RULES.get_or_init(|| {
        RegexSet::new([
            r"(?i)\.dds$",
            r"(?i)\.xcf$",
            r"(?i)\.yml$",
            r"(?i)\.gfx$",
            r"(?i)\.jpg$",
            r"(?i)\.png$",
            r"(?i)\.gui$",
        ])
        .expect("migrate patterns")
    })
}

/// Classify a file by its path relative to the mod root.
pub fn classify(segments: &[String]) -> FileRule {
    let path = segments.join("/");
    if skip_rules().is_match(&path) {
        FileRule::Skip
    } else if migrate_rules().is_match(&path) {
        FileRule::Migrate
    } else {
        FileRule::Merge
    }
}

/// Vanilla files that keep their name wherever they appear.
const ABSOLUTE_FILES: &[&str] = &[
    "00_common_categories.txt",
    "00_diplomacy_economy.txt",
    "00_urban_districts.txt",
    "02_rural_districts.txt",
];

/// Directories whose files keep their own names.
const COPY_DIRECT: &[&str] = &["events"];

/// Directories funnelled into one file, named `<target mod><suffix>`.
const FUNNELLED: &[(&str, &str)] = &[
    ("common/ambient_objects", "_ambient_objects.txt"),
    ("common/armies", "_armies.txt"),
    ("common/ascension_perks", "_ascension_perks.txt"),
    ("common/buildings", "_buildings.txt"),
    ("common/button_effects", "_button_effects.txt"),
    ("common/decisions", "_decisions.txt"),
    ("common/deposits", "_deposits.txt"),
    ("common/defines", "_defines.txt"),
    ("common/diplomatic_actions", "_diplomatic_actions.txt"),
    ("common/edicts", "_edicts.txt"),
    ("common/ethics", "_ethics.txt"),
    ("common/governments", "_governments.txt"),
    ("common/on_actions", "_on_actions.txt"),
    ("common/opinion_modifiers", "_opinion_modifiers.txt"),
    ("common/policies", "_policies.txt"),
    ("common/pop_jobs", "_jobs.txt"),
    ("common/scripted_triggers", "_scripted_triggers.txt"),
    ("common/ship_sizes", "_ship_sizes.txt"),
    ("common/special_projects", "_special_projects.txt"),
    ("common/species_rights", "_living_standards.txt"),
    ("common/starbase_buildings", "_starbase_buildings.txt"),
    ("common/starbase_modules", "_starbase_modules.txt"),
    ("common/static_modifiers", "_static_modifiers.txt"),
    ("common/technology", "_tech.txt"),
    ("common/trade_conversions", "_trade_conversions.txt"),
    ("common/traits", "_combined_traits.txt"),
];

/// Output file name for `file_name` found under `dirs` (relative to the
/// mod root).
pub fn translate(dirs: &[String], file_name: &str, target_mod: &str) -> String {
    let mut chars = file_name.chars();
    let vanilla_override = matches!(
        (chars.next(), chars.next()),
        (Some(a), Some(b)) if a.is_ascii_digit() && b.is_ascii_digit()
    );
    if vanilla_override || ABSOLUTE_FILES.contains(&file_name) {
        return file_name.to_string();
    }

    let dir = dirs.join("/");
    if COPY_DIRECT.contains(&dir.as_str()) {
        return file_name.to_string();
    }
    match FUNNELLED.iter().find(|(folder, _)| *folder == dir) {
        Some((_, suffix)) => format!("{}{}", target_mod, suffix),
        None => file_name.to_string(),
    }
}
