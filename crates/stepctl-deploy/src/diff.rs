//! Line diffs of JSON snapshots.
//!
//! Used by dry runs and `diff` to show what a deploy would change. Two
//! layouts are supported:
//!
//! - **Unified**: `---`/`+++` headers, `@@` hunks with 3 lines of context
//! - **Compact**: headers followed by changed lines only

use colored::Colorize;
use serde_json::Value;

const CONTEXT: usize = 3;

/// Largest LCS table built for the changed middle of two texts.
const MAX_TABLE_CELLS: usize = 4_000_000;

/// Output layout of a rendered diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiffFormat {
    /// Only changed lines.
    #[default]
    Compact,
    /// Hunks with surrounding context.
    Unified,
}

/// Rendering options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Layout.
    pub format: DiffFormat,
    /// Emit ANSI colors.
    pub color: bool,
}

/// One line of a computed diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLine<'a> {
    /// Present on both sides.
    Same(&'a str),
    /// Only in the old text.
    Removed(&'a str),
    /// Only in the new text.
    Added(&'a str),
}

impl DiffLine<'_> {
    const fn is_change(&self) -> bool {
        !matches!(self, Self::Same(_))
    }
}

/// Compute a line diff using the longest common subsequence.
///
/// Common leading and trailing lines are matched directly. If the remaining
/// middle would need more than `MAX_TABLE_CELLS` table cells it is shown as
/// a whole-block replace instead.
#[must_use]
pub fn diff_lines<'a>(old: &'a str, new: &'a str) -> Vec<DiffLine<'a>> {
    diff_lines_within(old, new, MAX_TABLE_CELLS)
}

fn diff_lines_within<'a>(old: &'a str, new: &'a str, max_cells: usize) -> Vec<DiffLine<'a>> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];

    let mut out = Vec::with_capacity(a.len().max(b.len()));
    out.extend(a[..prefix].iter().map(|&l| DiffLine::Same(l)));
    if (a_mid.len() + 1).saturating_mul(b_mid.len() + 1) > max_cells {
        out.extend(a_mid.iter().map(|&l| DiffLine::Removed(l)));
        out.extend(b_mid.iter().map(|&l| DiffLine::Added(l)));
    } else {
        lcs_diff(a_mid, b_mid, &mut out);
    }
    out.extend(a[a.len() - suffix..].iter().map(|&l| DiffLine::Same(l)));
    out
}

fn lcs_diff<'a>(a: &[&'a str], b: &[&'a str], out: &mut Vec<DiffLine<'a>>) {
    // lcs[i][j] is the LCS length of a[i..] and b[j..]
    let mut lcs = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            out.push(DiffLine::Same(a[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            out.push(DiffLine::Removed(a[i]));
            i += 1;
        } else {
            out.push(DiffLine::Added(b[j]));
            j += 1;
        }
    }
    out.extend(a[i..].iter().map(|&l| DiffLine::Removed(l)));
    out.extend(b[j..].iter().map(|&l| DiffLine::Added(l)));
}

/// Pretty-print a snapshot for diffing. `Null` renders as empty text.
#[must_use]
pub fn json_text(value: &Value) -> String {
    if value.is_null() {
        return String::new();
    }
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    text.push('\n');
    text
}

/// Render a diff between two texts, or `None` if they are identical.
#[must_use]
pub fn render(old_label: &str, new_label: &str, old: &str, new: &str, options: DiffOptions) -> Option<String> {
    let lines = diff_lines(old, new);
    if !lines.iter().any(DiffLine::is_change) {
        return None;
    }

    let mut out = String::new();
    push(&mut out, &format!("--- {old_label}"), Style::Header, options.color);
    push(&mut out, &format!("+++ {new_label}"), Style::Header, options.color);

    match options.format {
        DiffFormat::Compact => {
            for line in lines.iter().filter(|l| l.is_change()) {
                push_line(&mut out, *line, options.color);
            }
        }
        DiffFormat::Unified => {
            for hunk in hunks(&lines) {
                push(&mut out, &hunk.header(&lines), Style::Hunk, options.color);
                for line in &lines[hunk.start..hunk.end] {
                    push_line(&mut out, *line, options.color);
                }
            }
        }
    }
    Some(out)
}

/// Render a diff between two JSON snapshots.
#[must_use]
pub fn render_json(old_label: &str, new_label: &str, old: &Value, new: &Value, options: DiffOptions) -> Option<String> {
    render(old_label, new_label, &json_text(old), &json_text(new), options)
}

#[derive(Debug, Clone, Copy)]
enum Style {
    Header,
    Hunk,
    Removed,
    Added,
    Plain,
}

fn push(out: &mut String, text: &str, style: Style, color: bool) {
    if color {
        let painted = match style {
            Style::Header => text.bold(),
            Style::Hunk => text.cyan(),
            Style::Removed => text.red(),
            Style::Added => text.green(),
            Style::Plain => text.normal(),
        };
        out.push_str(&painted.to_string());
    } else {
        out.push_str(text);
    }
    out.push('\n');
}

fn push_line(out: &mut String, line: DiffLine<'_>, color: bool) {
    match line {
        DiffLine::Same(l) => push(out, &format!(" {l}"), Style::Plain, color),
        DiffLine::Removed(l) => push(out, &format!("-{l}"), Style::Removed, color),
        DiffLine::Added(l) => push(out, &format!("+{l}"), Style::Added, color),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hunk {
    start: usize,
    end: usize,
}

impl Hunk {
    fn header(&self, lines: &[DiffLine<'_>]) -> String {
        let before = &lines[..self.start];
        let old_offset = before.iter().filter(|l| !matches!(l, DiffLine::Added(_))).count();
        let new_offset = before.iter().filter(|l| !matches!(l, DiffLine::Removed(_))).count();

        let body = &lines[self.start..self.end];
        let old_len = body.iter().filter(|l| !matches!(l, DiffLine::Added(_))).count();
        let new_len = body.iter().filter(|l| !matches!(l, DiffLine::Removed(_))).count();

        let start = |offset: usize, len: usize| if len == 0 { offset } else { offset + 1 };
        format!(
            "@@ -{},{old_len} +{},{new_len} @@",
            start(old_offset, old_len),
            start(new_offset, new_len)
        )
    }
}

fn hunks(lines: &[DiffLine<'_>]) -> Vec<Hunk> {
    let mut hunks: Vec<Hunk> = Vec::new();
    for (idx, _) in lines.iter().enumerate().filter(|(_, l)| l.is_change()) {
        let start = idx.saturating_sub(CONTEXT);
        let end = (idx + CONTEXT + 1).min(lines.len());
        match hunks.last_mut() {
            Some(last) if start <= last.end => last.end = end,
            _ => hunks.push(Hunk { start, end }),
        }
    }
    hunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PLAIN_UNIFIED: DiffOptions = DiffOptions {
        format: DiffFormat::Unified,
        color: false,
    };

    #[test]
    fn identical_texts_render_nothing() {
        let v = json!({"a": 1, "b": [1, 2]});
        assert_eq!(render_json("x", "x", &v, &v, PLAIN_UNIFIED), None);
        assert_eq!(render("x", "x", "", "", DiffOptions::default()), None);
    }

    #[test]
    fn lcs_keeps_common_lines() {
        let lines = diff_lines("a\nb\nc\n", "a\nx\nc\n");
        assert_eq!(
            lines,
            vec![
                DiffLine::Same("a"),
                DiffLine::Removed("b"),
                DiffLine::Added("x"),
                DiffLine::Same("c"),
            ]
        );
    }

    #[test]
    fn large_texts_with_one_change_diff_minimally() {
        let old: String = (1..=50_000).map(|n| format!("line{n}\n")).collect();
        let new = old.replace("line25000\n", "changed\n");

        let lines = diff_lines(&old, &new);
        assert_eq!(lines.len(), 50_001);
        let changes: Vec<_> = lines.iter().filter(|l| l.is_change()).collect();
        assert_eq!(
            changes,
            vec![&DiffLine::Removed("line25000"), &DiffLine::Added("changed")]
        );
    }

    #[test]
    fn oversized_middle_falls_back_to_block_replace() {
        let old = "a\nb\nc\nd\n";
        let new = "a\nc\nb\nd\n";

        // the 2x2 middle needs a 3x3 table
        assert_eq!(
            diff_lines_within(old, new, 4),
            vec![
                DiffLine::Same("a"),
                DiffLine::Removed("b"),
                DiffLine::Removed("c"),
                DiffLine::Added("c"),
                DiffLine::Added("b"),
                DiffLine::Same("d"),
            ]
        );
        assert_eq!(diff_lines(old, new).iter().filter(|l| l.is_change()).count(), 2);
    }

    #[test]
    fn compact_shows_only_changes() {
        let out = render(
            "old",
            "new",
            "a\nb\nc\n",
            "a\nB\nc\n",
            DiffOptions::default(),
        )
        .unwrap();
        assert_eq!(out, "--- old\n+++ new\n-b\n+B\n");
    }

    #[test]
    fn unified_uses_three_lines_of_context() {
        let old: String = (1..=10).map(|n| format!("{n}\n")).collect();
        let new = old.replace("5\n", "five\n");

        let out = render("old", "new", &old, &new, PLAIN_UNIFIED).unwrap();
        assert_eq!(
            out,
            "--- old\n+++ new\n@@ -2,7 +2,7 @@\n 2\n 3\n 4\n-5\n+five\n 6\n 7\n 8\n"
        );
    }

    #[test]
    fn distant_changes_make_separate_hunks() {
        let old: String = (1..=20).map(|n| format!("line{n}\n")).collect();
        let new = old
            .replace("line2\n", "line two\n")
            .replace("line18\n", "line eighteen\n");

        let out = render("old", "new", &old, &new, PLAIN_UNIFIED).unwrap();
        assert_eq!(out.matches("@@ -").count(), 2);
    }

    #[test]
    fn added_resource_diffs_against_empty() {
        let out = render_json(
            "/dev/null",
            "rule/nightly",
            &Value::Null,
            &json!({"name": "nightly"}),
            PLAIN_UNIFIED,
        )
        .unwrap();
        assert!(out.contains("@@ -0,0 +1,3 @@"));
        assert!(out.contains("+  \"name\": \"nightly\""));
    }

    #[test]
    fn color_wraps_lines_in_escapes() {
        colored::control::set_override(true);
        let out = render(
            "old",
            "new",
            "a\n",
            "b\n",
            DiffOptions {
                format: DiffFormat::Compact,
                color: true,
            },
        )
        .unwrap();
        assert!(out.contains("\u{1b}["));
    }
}
