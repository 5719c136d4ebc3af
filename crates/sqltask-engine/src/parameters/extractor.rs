//! T-SQL Parameter Extractor
//!
//! Finds `@name` placeholders in a statement. Placeholders inside string
//! literals, comments and delimited identifiers are ignored, as are system
//! functions (`@@ROWCOUNT`), variables the statement declares itself and the
//! parameter names of `EXEC` named arguments.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// A placeholder occurrence in a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Byte offset of the `@`
    pub start: usize,
    /// Byte offset just past the name
    pub end: usize,
    /// Name without the `@`
    pub name: String,
}

static AT_NAMED_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@{1,2}([a-zA-Z_#][a-zA-Z0-9_#$]*)").expect("valid regex"));

// String literals (with '' escapes), comments, [bracketed] and "quoted" identifiers
static SKIP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|--[^\n]*|/\*[\s\S]*?\*/|\[(?:[^\]]|\]\])*\]|"(?:[^"]|"")*""#)
        .expect("valid regex")
});

static DECLARE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bDECLARE\b[^;\n]*").expect("valid regex"));

static EXEC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bEXEC(?:UTE)?\b").expect("valid regex"));

// A line that starts a new statement without a `;` before it
static STATEMENT_START_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\n\s*(?:SELECT|INSERT|UPDATE|DELETE|MERGE|DECLARE|SET|IF|ELSE|WHILE|BEGIN|END|RETURN|WITH|EXEC|EXECUTE|PRINT|RAISERROR|THROW|TRUNCATE|CREATE|ALTER|DROP)\b",
    )
    .expect("valid regex")
});

static ASSIGNMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*=").expect("valid regex"));

/// Replace string literals, comments and delimited identifiers with spaces,
/// keeping every byte offset unchanged.
pub(crate) fn mask_literals(sql: &str) -> String {
    SKIP_REGEX
        .replace_all(sql, |caps: &regex::Captures| " ".repeat(caps[0].len()))
        .into_owned()
}

/// Names of the variables a statement declares, lowercased
fn declared_variables(masked: &str) -> HashSet<String> {
    DECLARE_REGEX
        .find_iter(masked)
        .flat_map(|segment| declarator_names(segment.as_str()))
        .map(str::to_lowercase)
        .collect()
}

/// Variables named by the declarators of one `DECLARE` segment.
///
/// A declarator starts right after `DECLARE` and after every comma outside
/// parentheses; names inside initializers are references, not declarations.
fn declarator_names(segment: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut depth = 0usize;
    let mut expect_name = true;
    let start = "DECLARE".len();

    for (offset, ch) in segment[start..].char_indices() {
        let pos = start + offset;
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                expect_name = true;
                continue;
            }
            c if c.is_whitespace() => continue,
            _ => {}
        }
        if expect_name {
            expect_name = false;
            if let Some(cap) = AT_NAMED_REGEX.captures_at(segment, pos) {
                if let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) {
                    if full.start() == pos && !full.as_str().starts_with("@@") {
                        names.push(name.as_str());
                    }
                }
            }
        }
    }
    names
}

/// Byte ranges of `EXEC` statements.
///
/// A range ends at the next `;` or at the next line that starts another
/// statement.
fn exec_ranges(masked: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut pos = 0;
    while let Some(m) = EXEC_REGEX.find_at(masked, pos) {
        let rest = &masked[m.end()..];
        let semicolon = rest.find(';').unwrap_or(rest.len());
        let next_statement = STATEMENT_START_REGEX
            .find(rest)
            .map_or(rest.len(), |s| s.start());
        let end = m.end() + semicolon.min(next_statement);
        ranges.push((m.start(), end));
        pos = end.max(m.end());
    }
    ranges
}

/// Every placeholder occurrence, in order of appearance
pub fn find_placeholders(sql: &str) -> Vec<Placeholder> {
    let masked = mask_literals(sql);
    let declared = declared_variables(&masked);
    let execs = exec_ranges(&masked);
    let in_exec = |pos: usize| execs.iter().any(|(s, e)| pos >= *s && pos < *e);

    let mut placeholders = Vec::new();
    for cap in AT_NAMED_REGEX.captures_iter(&masked) {
        let (Some(full), Some(name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if full.as_str().starts_with("@@") {
            continue;
        }
        if declared.contains(&name.as_str().to_lowercase()) {
            continue;
        }
        if in_exec(full.start()) && ASSIGNMENT_REGEX.is_match(&masked[full.end()..]) {
            continue;
        }
        placeholders.push(Placeholder {
            start: full.start(),
            end: full.end(),
            name: name.as_str().to_string(),
        });
    }
    placeholders
}

/// Distinct placeholder names in order of first appearance.
///
/// Names differing only in case are the same parameter; the first spelling wins.
pub fn extract_parameters(sql: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    find_placeholders(sql)
        .into_iter()
        .filter(|p| seen.insert(p.name.to_lowercase()))
        .map(|p| p.name)
        .collect()
}
