//! Line-level diff between two rounds of a document.
//!
//! Classic LCS dynamic programming: the `(m+1) x (n+1)` table holds the LCS
//! length of every prefix pair, then a walk from the end back to the start
//! emits entries in reverse. When skipping either side would keep the same LCS
//! length the walk emits `Added` first, so runs of identical lines (blank
//! lines in markdown) always diff the same way.

use crate::types::DiffEntry;

/// Computes the line diff from `old` to `new`.
///
/// Lines are split on `\n`; an empty string has zero lines. Every line of
/// `old` appears exactly once as `Unchanged` or `Removed`, every line of `new`
/// exactly once as `Unchanged` or `Added`, both in source order.
pub fn compute_line_diff(old: &str, new: &str) -> Vec<DiffEntry> {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let (m, n) = (old_lines.len(), new_lines.len());

    // table[i][j] = LCS length of old_lines[..i] and new_lines[..j]
    let mut table = vec![vec![0u32; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            table[i][j] = if old_lines[i - 1] == new_lines[j - 1] {
                table[i - 1][j - 1] + 1
            } else {
                table[i - 1][j].max(table[i][j - 1])
            };
        }
    }

    let mut entries = Vec::with_capacity(m + n);
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && old_lines[i - 1] == new_lines[j - 1] {
            entries.push(DiffEntry::Unchanged {
                text: old_lines[i - 1].to_owned(),
                old_line: i,
                new_line: j,
            });
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || table[i][j - 1] >= table[i - 1][j]) {
            entries.push(DiffEntry::Added { text: new_lines[j - 1].to_owned(), new_line: j });
            j -= 1;
        } else {
            entries.push(DiffEntry::Removed { text: old_lines[i - 1].to_owned(), old_line: i });
            i -= 1;
        }
    }

    entries.reverse();
    entries
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        Vec::new()
    } else {
        text.split('\n').collect()
    }
}
