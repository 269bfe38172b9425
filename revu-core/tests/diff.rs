//! Line diff behaviour used for round-over-round document views.

use revu_core::diff::compute_line_diff;
use revu_core::types::DiffEntry;

fn unchanged(text: &str, old_line: usize, new_line: usize) -> DiffEntry {
    DiffEntry::Unchanged { text: text.to_owned(), old_line, new_line }
}

fn added(text: &str, new_line: usize) -> DiffEntry {
    DiffEntry::Added { text: text.to_owned(), new_line }
}

fn removed(text: &str, old_line: usize) -> DiffEntry {
    DiffEntry::Removed { text: text.to_owned(), old_line }
}

/// Rebuilds both sides from the entries, checking line numbers are sequential.
fn reconstruct(entries: &[DiffEntry]) -> (Vec<String>, Vec<String>) {
    let mut old = Vec::new();
    let mut new = Vec::new();
    for entry in entries {
        if let Some(n) = entry.old_line() {
            assert_eq!(n, old.len() + 1, "old line numbers must be sequential");
            old.push(entry.text().to_owned());
        }
        if let Some(n) = entry.new_line() {
            assert_eq!(n, new.len() + 1, "new line numbers must be sequential");
            new.push(entry.text().to_owned());
        }
    }
    (old, new)
}

fn lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').map(str::to_owned).collect()
    }
}

#[test]
fn replaced_and_appended_lines() {
    let entries = compute_line_diff("a\nb\nc", "a\nx\nc\nd");
    assert_eq!(
        entries,
        vec![
            unchanged("a", 1, 1),
            removed("b", 2),
            added("x", 2),
            unchanged("c", 3, 3),
            added("d", 4),
        ]
    );
}

#[test]
fn identical_input_is_all_unchanged() {
    let text = "# Plan\n\n- step one\n- step two\n";
    let entries = compute_line_diff(text, text);
    assert_eq!(entries.len(), lines(text).len());
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry, &unchanged(entry.text(), i + 1, i + 1));
    }
}

#[test]
fn empty_sides() {
    assert!(compute_line_diff("", "").is_empty());
    assert_eq!(compute_line_diff("", "x\ny"), vec![added("x", 1), added("y", 2)]);
    assert_eq!(compute_line_diff("x\ny", ""), vec![removed("x", 1), removed("y", 2)]);
}

#[test]
fn blank_line_runs_are_stable() {
    let old = "title\n\n\nbody";
    let new = "title\n\nbody";
    let first = compute_line_diff(old, new);
    let second = compute_line_diff(old, new);
    assert_eq!(first, second);
    assert_eq!(first.iter().filter(|e| matches!(e, DiffEntry::Removed { .. })).count(), 1);
    assert_eq!(first.iter().filter(|e| matches!(e, DiffEntry::Added { .. })).count(), 0);
}

#[test]
fn entries_reconstruct_both_sides() {
    let cases = [
        ("a\nb\nc", "a\nx\nc\nd"),
        ("one\ntwo\nthree\nfour", "zero\none\nthree\nfive"),
        ("same\nsame\nsame", "same\nother\nsame"),
        ("", "only new"),
        ("only old", ""),
        ("x\ny\nz", "z\ny\nx"),
        ("trailing\n", "trailing\nmore\n"),
    ];
    for (old, new) in cases {
        let entries = compute_line_diff(old, new);
        let (rebuilt_old, rebuilt_new) = reconstruct(&entries);
        assert_eq!(rebuilt_old, lines(old), "old side of {old:?} -> {new:?}");
        assert_eq!(rebuilt_new, lines(new), "new side of {old:?} -> {new:?}");
    }
}

#[test]
fn unchanged_count_is_longest_common_subsequence() {
    // LCS of ABCBDAB / BDCABA has length 4.
    let old = "A\nB\nC\nB\nD\nA\nB";
    let new = "B\nD\nC\nA\nB\nA";
    let entries = compute_line_diff(old, new);
    let kept = entries.iter().filter(|e| matches!(e, DiffEntry::Unchanged { .. })).count();
    assert_eq!(kept, 4);
}
