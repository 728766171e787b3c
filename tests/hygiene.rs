//! Hygiene — coding standards enforced at test time.
//!
//! Scans the non-test sources under `src/` for patterns that crash the
//! process or silently drop errors. Each pattern has a budget; the budgets
//! are zero and only ever go down.

use std::fs;
use std::path::Path;

struct SourceFile {
    path: String,
    content: String,
}

fn source_files() -> Vec<SourceFile> {
    let mut files = Vec::new();
    collect_rs_files(Path::new(env!("CARGO_MANIFEST_DIR")).join("src").as_path(), &mut files);
    files
}

fn collect_rs_files(dir: &Path, out: &mut Vec<SourceFile>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rs_files(&path, out);
            continue;
        }
        let path_str = path.to_string_lossy().to_string();
        if !path_str.ends_with(".rs") || path_str.ends_with("_test.rs") {
            continue;
        }
        if let Ok(content) = fs::read_to_string(&path) {
            out.push(SourceFile { path: path_str, content });
        }
    }
}

/// Lines containing `pattern`, outside `#[cfg(test)]` helper modules.
fn hits(files: &[SourceFile], pattern: &str) -> Vec<String> {
    let mut found = Vec::new();
    for file in files {
        let production = file.content.split("#[cfg(test)]\npub mod").next().unwrap_or_default();
        for (n, line) in production.lines().enumerate() {
            if line.contains(pattern) {
                found.push(format!("  {}:{}: {}", file.path, n + 1, line.trim()));
            }
        }
    }
    found
}

fn assert_budget(pattern: &str, budget: usize) {
    let files = source_files();
    assert!(!files.is_empty(), "no sources found");
    let found = hits(&files, pattern);
    assert!(
        found.len() <= budget,
        "`{pattern}` budget exceeded: found {}, max {budget}.\n{}",
        found.len(),
        found.join("\n")
    );
}

// Panics.

#[test]
fn unwrap_budget() {
    assert_budget(".unwrap()", 0);
}

#[test]
fn expect_budget() {
    assert_budget(".expect(", 0);
}

#[test]
fn panic_budget() {
    assert_budget("panic!(", 0);
}

#[test]
fn unreachable_budget() {
    assert_budget("unreachable!(", 0);
}

#[test]
fn todo_budget() {
    assert_budget("todo!(", 0);
}

#[test]
fn unimplemented_budget() {
    assert_budget("unimplemented!(", 0);
}

// Silent loss.

#[test]
fn silent_discard_budget() {
    assert_budget("let _ =", 0);
}

#[test]
fn dot_ok_budget() {
    assert_budget(".ok()", 0);
}

// Structure.

#[test]
fn allow_dead_code_budget() {
    assert_budget("#[allow(dead_code)]", 0);
}
