//! Textual pre-pass run before the grammar.
//!
//! Each step is a whole-text rewrite. The order matters: comments go before
//! the shorthand rewrites so that braces inside comments are never touched.
//! The shorthand rewrites only ever see text outside double-quoted strings.

use std::sync::OnceLock;

use regex::Regex;

/// The only comment that survives normalization.
pub const ORIGIN_MARKER: &str = "#ORIGIN = ";

struct Rules {
    descriptor_lists: Regex,
    implicit_assignment: Regex,
    quoted_key: Regex,
    assign_brace: Regex,
    stray_empty: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        descriptor_lists: Regex::new(r"(?m)^(?:dependencies|tags)=\{[^}\n]*\}$")
            .expect("descriptor list pattern"),
        implicit_assignment: Regex::new(r"([A-Za-z0-9_.\-]+)\{").expect("implicit assignment pattern"),
        quoted_key: Regex::new(r#"^"([A-Za-z0-9_.\-]+)"$"#).expect("quoted key pattern"),
        assign_brace: Regex::new(r"=\s*\{").expect("assign brace pattern"),
        stray_empty: Regex::new(r"(?m)^\s*\{\s*\}").expect("stray empty pattern"),
    })
}

/// Rewrite raw text into the shape the grammar accepts.
///
/// Returns `None` when nothing but whitespace is left, which is how
/// comment-only files are reported.
pub fn normalize(src: &str) -> Option<String> {
    let rules = rules();
    let src = src.strip_prefix('\u{feff}').unwrap_or(src);
    let text = src.replace("\r\n", "\n");
    let text = rules.descriptor_lists.replace_all(&text, "");
    let text = strip_comments(&text);
    let text = rewrite_shorthands(&text);
    let text = rules.stray_empty.replace_all(&text, "");

    if text.trim().is_empty() {
        tracing::debug!("normalization left only whitespace");
        return None;
    }
    Some(text.into_owned())
}

/// Expand `key{` to `key={`, unquote `"key" =`, and collapse `=  {` to
/// `={`, leaving the contents of quoted strings alone.
fn rewrite_shorthands(text: &str) -> String {
    let rules = rules();
    let runs = quoted_runs(text);
    let mut out = String::with_capacity(text.len());
    let mut after_key = false;

    for (i, &(quoted, run)) in runs.iter().enumerate() {
        if quoted {
            let assigns = runs
                .get(i + 1)
                .is_some_and(|(_, next)| next.trim_start().starts_with('='));
            match rules.quoted_key.captures(run) {
                Some(caps) if assigns => {
                    out.push_str(&caps[1]);
                    after_key = true;
                }
                _ => out.push_str(run),
            }
            continue;
        }

        let run = if after_key { run.trim_start() } else { run };
        after_key = false;
        let run = rules.implicit_assignment.replace_all(run, "${1}={");
        let run = rules.assign_brace.replace_all(&run, "={");
        out.push_str(&run);
    }
    out
}

/// Split `text` into alternating runs, flagging double-quoted ones (quotes
/// included). An unterminated string runs to the end of the text.
fn quoted_runs(text: &str) -> Vec<(bool, &str)> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_quotes {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    runs.push((true, &text[start..=i]));
                    start = i + 1;
                    in_quotes = false;
                }
                _ => {}
            }
        } else if ch == '"' {
            if i > start {
                runs.push((false, &text[start..i]));
            }
            start = i;
            in_quotes = true;
        }
    }
    if start < text.len() {
        runs.push((in_quotes, &text[start..]));
    }
    runs
}

/// Drop `#` comments to the end of their line, keeping `#ORIGIN = ...`
/// annotations. A `#` inside a double-quoted string is not a comment.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(strip_line_comment(line));
    }
    out
}

fn strip_line_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, ch) in line.char_indices() {
        if in_quotes {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quotes = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            '#' => {
                let rest = &line[i..];
                if rest.starts_with(ORIGIN_MARKER) {
                    return line;
                }
                return line[..i].trim_end();
            }
            _ => {}
        }
    }
    line
}
