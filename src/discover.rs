use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Collect files matching `pattern` one repository level below `root`,
/// optionally under a fixed assignment sub-path inside each repository.
/// Results are sorted so submission order is deterministic.
pub fn collect_files(root: &Path, pattern: &str, assignment_path: &str) -> Result<Vec<PathBuf>> {
    let sub = assignment_path.trim_matches('/');
    let full = if sub.is_empty() {
        format!("*/{pattern}")
    } else {
        format!("*/{sub}/{pattern}")
    };
    // literal_separator keeps `*` within one path component, so a pattern
    // names exactly one repository level.
    let matcher = GlobBuilder::new(&full)
        .literal_separator(true)
        .build()
        .with_context(|| format!("bad glob: {full}"))?
        .compile_matcher();

    let mut out = Vec::new();
    if root.is_dir() {
        walk(root, root, &matcher, &mut out)?;
    }
    out.sort();
    Ok(out)
}

fn walk(root: &Path, dir: &Path, matcher: &GlobMatcher, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("reading entry in {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, matcher, out)?;
        } else if path
            .strip_prefix(root)
            .map(|rel| matcher.is_match(rel))
            .unwrap_or(false)
        {
            out.push(path);
        }
    }
    Ok(())
}

/// Keep only files worth uploading: non-empty, and for C-family sources,
/// containing something besides comments.
pub fn filter_valid(files: Vec<PathBuf>, lang: &str) -> Vec<PathBuf> {
    files
        .into_iter()
        .filter(|f| is_valid_source(f, lang))
        .collect()
}

pub fn is_valid_source(path: &Path, lang: &str) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if meta.len() == 0 {
        return false;
    }
    if !matches!(lang, "c" | "cc") {
        return true;
    }
    match std::fs::read_to_string(path) {
        Ok(text) => has_code(&text),
        // Unreadable or non-UTF-8 content is left for the service to judge.
        Err(_) => true,
    }
}

fn has_code(text: &str) -> bool {
    let without_line_comments: String = text
        .lines()
        .filter(|l| !l.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n");
    strip_block_comments(&without_line_comments)
        .chars()
        .any(|c| c.is_alphanumeric())
}

// Does not honor comment markers inside string literals; this only backs an
// emptiness check.
fn strip_block_comments(text: &str) -> String {
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    let re = BLOCK.get_or_init(|| {
        Regex::new(r"(?s)/\*.*?\*/").unwrap_or_else(|_| unreachable!())
    });
    re.replace_all(text, "").into_owned()
}
