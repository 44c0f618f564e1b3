// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Fuzzy-matching string replacement.
//!
//! Turns an approximate `old → new` rewrite into an exact single or
//! multi replacement.  Nine strategies run in a fixed total order; each
//! yields candidate substrings of the content that may be treated as
//! equivalent to `old`:
//!
//! 1. exact substring
//! 2. per-line trimmed window
//! 3. first/last-line anchors scored by Levenshtein similarity
//! 4. whitespace runs collapsed to single spaces
//! 5. common leading indentation stripped from both sides
//! 6. literal escape sequences interpreted
//! 7. outer whitespace trimmed from `old`
//! 8. anchors with a ≥50% interior line match
//! 9. every exact occurrence (effective only with `replace_all`)
//!
//! The first candidate that locates uniquely wins; candidates that appear
//! more than once fall through to the next strategy.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EditError {
    #[error("old and new strings are identical")]
    NoOp,

    #[error("old string not found in content")]
    NotFound,

    #[error("found multiple matches; provide more context to identify unique match")]
    Ambiguous,
}

/// Replace `old` with `new` in `content`.
///
/// With `replace_all`, every occurrence of the first located candidate is
/// rewritten.  Otherwise the candidate must occur exactly once; ambiguous
/// candidates are skipped in favor of later strategies, and
/// [`EditError::Ambiguous`] is returned only when every strategy matched
/// ambiguously.
pub fn replace(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> Result<String, EditError> {
    if old == new {
        return Err(EditError::NoOp);
    }

    let strategies: &[fn(&str, &str) -> Vec<String>] = &[
        exact_match,
        line_trimmed_match,
        block_anchor_match,
        whitespace_normalized_match,
        indentation_flexible_match,
        escape_normalized_match,
        trimmed_boundary_match,
        context_aware_match,
        multi_occurrence_match,
    ];

    let mut saw_candidate = false;

    for strategy in strategies {
        for candidate in strategy(content, old) {
            let Some(index) = content.find(&candidate) else {
                continue;
            };
            saw_candidate = true;

            // When a strategy matched a window indented differently from
            // `old`, shift the replacement by the same delta so the
            // surrounding block structure survives the edit.
            let adjusted = shift_indent(new, indent_delta(&candidate, old));

            if replace_all {
                return Ok(content.replace(&candidate, &adjusted));
            }

            // Skip candidates that appear more than once.
            if content.rfind(&candidate) != Some(index) {
                continue;
            }

            let mut result = String::with_capacity(content.len() + adjusted.len());
            result.push_str(&content[..index]);
            result.push_str(&adjusted);
            result.push_str(&content[index + candidate.len()..]);
            return Ok(result);
        }
    }

    if saw_candidate {
        Err(EditError::Ambiguous)
    } else {
        Err(EditError::NotFound)
    }
}

/// Leading-whitespace width of the first non-blank line.
fn first_line_indent(text: &str) -> i64 {
    text.split('\n')
        .find(|l| !l.trim().is_empty())
        .map(|l| (l.len() - l.trim_start().len()) as i64)
        .unwrap_or(0)
}

fn indent_delta(candidate: &str, old: &str) -> i64 {
    first_line_indent(candidate) - first_line_indent(old)
}

/// Shift every non-blank line by `delta` (positive = indent, negative =
/// dedent, clamped to the line's existing indentation).
fn shift_indent(text: &str, delta: i64) -> String {
    if delta == 0 {
        return text.to_string();
    }
    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else if delta > 0 {
                format!("{}{line}", " ".repeat(delta as usize))
            } else {
                let have = line.len() - line.trim_start().len();
                line[((-delta) as usize).min(have)..].to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ─── Levenshtein ─────────────────────────────────────────────────────────────

/// Classic two-row edit distance over characters.
fn levenshtein(a: &str, b: &str) -> usize {
    if a.is_empty() || b.is_empty() {
        return a.chars().count().max(b.chars().count());
    }
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr: Vec<usize> = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// `1 − distance / max(len)`; 1.0 for two empty strings.
fn similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

// ─── Strategies ──────────────────────────────────────────────────────────────

/// 1. Yield `old` verbatim, enabling a plain substring check.
fn exact_match(_content: &str, old: &str) -> Vec<String> {
    vec![old.to_string()]
}

/// Split into lines, dropping one trailing empty line (a trailing `\n` in
/// `old` should not demand an extra empty line in the window).
fn search_lines(old: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = old.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

/// 2. Slide a window of `|old|` lines; match when every line equals its
/// counterpart after trimming; yield the window's original bytes.
fn line_trimmed_match(content: &str, old: &str) -> Vec<String> {
    let haystack: Vec<&str> = content.split('\n').collect();
    let needle = search_lines(old);
    if needle.is_empty() || needle.len() > haystack.len() {
        return vec![];
    }

    let mut results = Vec::new();
    for start in 0..=haystack.len() - needle.len() {
        let window = &haystack[start..start + needle.len()];
        if window
            .iter()
            .zip(&needle)
            .all(|(w, n)| w.trim() == n.trim())
        {
            results.push(window.join("\n"));
        }
    }
    results
}

const SINGLE_CANDIDATE_THRESHOLD: f64 = 0.0;
const MULTI_CANDIDATE_THRESHOLD: f64 = 0.3;

/// 3. Anchor on the first and last trimmed lines, score candidate blocks by
/// the mean Levenshtein similarity of their interior lines, and accept the
/// best: any similarity for a lone candidate, ≥ 0.3 when several compete.
fn block_anchor_match(content: &str, old: &str) -> Vec<String> {
    let needle = search_lines(old);
    if needle.len() < 3 {
        return vec![];
    }
    let haystack: Vec<&str> = content.split('\n').collect();
    let first = needle[0].trim();
    let last = needle[needle.len() - 1].trim();

    let mut candidates: Vec<(usize, usize)> = Vec::new();
    for i in 0..haystack.len() {
        if haystack[i].trim() != first {
            continue;
        }
        for j in i + 2..haystack.len() {
            if haystack[j].trim() == last {
                candidates.push((i, j));
                break;
            }
        }
    }
    if candidates.is_empty() {
        return vec![];
    }

    let interior_similarity = |start: usize, end: usize| -> f64 {
        let interior = (needle.len() - 2).min(end - start - 1);
        if interior == 0 {
            return 1.0;
        }
        let mut total = 0.0;
        for k in 1..=interior {
            total += similarity(haystack[start + k].trim(), needle[k].trim());
        }
        total / interior as f64
    };

    let extract = |start: usize, end: usize| haystack[start..=end].join("\n");

    if candidates.len() == 1 {
        let (s, e) = candidates[0];
        if interior_similarity(s, e) >= SINGLE_CANDIDATE_THRESHOLD {
            return vec![extract(s, e)];
        }
        return vec![];
    }

    let mut best: Option<(usize, usize)> = None;
    let mut best_score = -1.0f64;
    for &(s, e) in &candidates {
        let score = interior_similarity(s, e);
        if score > best_score {
            best_score = score;
            best = Some((s, e));
        }
    }
    match best {
        Some((s, e)) if best_score >= MULTI_CANDIDATE_THRESHOLD => vec![extract(s, e)],
        _ => vec![],
    }
}

/// Collapse every whitespace run to a single space and trim.
fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 4. Compare under whitespace normalization.  Single-line needles also try
/// a word-spaced regex so the matched span keeps its original spacing.
fn whitespace_normalized_match(content: &str, old: &str) -> Vec<String> {
    let norm_old = normalize_whitespace(old);
    if norm_old.is_empty() {
        return vec![];
    }
    let haystack: Vec<&str> = content.split('\n').collect();
    let mut results = Vec::new();

    for line in &haystack {
        if normalize_whitespace(line) == norm_old {
            results.push(line.to_string());
        } else if normalize_whitespace(line).contains(&norm_old) {
            let words: Vec<&str> = old.split_whitespace().collect();
            if !words.is_empty() {
                let pattern = words
                    .iter()
                    .map(|w| regex::escape(w))
                    .collect::<Vec<_>>()
                    .join(r"\s+");
                if let Ok(re) = regex::Regex::new(&pattern) {
                    if let Some(m) = re.find(line) {
                        results.push(m.as_str().to_string());
                    }
                }
            }
        }
    }

    let needle_len = old.split('\n').count();
    if needle_len > 1 && needle_len <= haystack.len() {
        for start in 0..=haystack.len() - needle_len {
            let window = haystack[start..start + needle_len].join("\n");
            if normalize_whitespace(&window) == norm_old {
                results.push(window);
            }
        }
    }
    results
}

/// Strip the minimum common leading indentation of the non-empty lines.
fn strip_common_indent(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let min_indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    if min_indent == 0 {
        return text.to_string();
    }
    lines
        .iter()
        .map(|l| {
            if l.trim().is_empty() {
                l.to_string()
            } else {
                l[min_indent.min(l.len())..].to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 5. Compare after stripping common leading indentation from both sides.
fn indentation_flexible_match(content: &str, old: &str) -> Vec<String> {
    let norm_old = strip_common_indent(old);
    let haystack: Vec<&str> = content.split('\n').collect();
    let needle_len = old.split('\n').count();
    if needle_len > haystack.len() {
        return vec![];
    }
    let mut results = Vec::new();

    for start in 0..=haystack.len() - needle_len {
        let window = haystack[start..start + needle_len].join("\n");
        if strip_common_indent(&window) == norm_old {
            results.push(window);
        }
    }
    results
}

/// Interpret literal `\n \t \r \" \' \\ \$ \`` escape sequences.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some('$') => out.push('$'),
            Some('`') => out.push('`'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// 6. Unescape `old` and retry exact plus windowed comparison.
fn escape_normalized_match(content: &str, old: &str) -> Vec<String> {
    let unescaped = unescape(old);
    if unescaped == old {
        return vec![];
    }
    let mut results = Vec::new();
    if content.contains(&unescaped) {
        results.push(unescaped.clone());
    }

    let haystack: Vec<&str> = content.split('\n').collect();
    let needle_len = unescaped.split('\n').count();
    if needle_len > haystack.len() {
        return results;
    }
    for start in 0..=haystack.len() - needle_len {
        let window = haystack[start..start + needle_len].join("\n");
        if unescape(&window) == unescaped && !results.contains(&window) {
            results.push(window);
        }
    }
    results
}

/// 7. Try the trimmed form of `old` when trimming changes it.
fn trimmed_boundary_match(content: &str, old: &str) -> Vec<String> {
    let trimmed = old.trim();
    if trimmed == old || trimmed.is_empty() {
        return vec![];
    }
    let mut results = Vec::new();
    if content.contains(trimmed) {
        results.push(trimmed.to_string());
    }
    let haystack: Vec<&str> = content.split('\n').collect();
    let needle_len = old.split('\n').count();
    if needle_len > haystack.len() {
        return results;
    }
    for start in 0..=haystack.len() - needle_len {
        let window = haystack[start..start + needle_len].join("\n");
        if window.trim() == trimmed && !results.contains(&window) {
            results.push(window);
        }
    }
    results
}

/// 8. Anchor on exact (trimmed) first and last lines; accept same-length
/// blocks whose interior lines match at least 50% after trimming.
fn context_aware_match(content: &str, old: &str) -> Vec<String> {
    let needle = search_lines(old);
    if needle.len() < 3 {
        return vec![];
    }
    let haystack: Vec<&str> = content.split('\n').collect();
    let first = needle[0].trim();
    let last = needle[needle.len() - 1].trim();
    let mut results = Vec::new();

    'outer: for i in 0..haystack.len() {
        if haystack[i].trim() != first {
            continue;
        }
        for j in i + 2..haystack.len() {
            if haystack[j].trim() != last {
                continue;
            }
            let block = &haystack[i..=j];
            if block.len() == needle.len() {
                let mut matching = 0usize;
                let mut total = 0usize;
                for k in 1..block.len() - 1 {
                    let b = block[k].trim();
                    let n = needle[k].trim();
                    if !b.is_empty() || !n.is_empty() {
                        total += 1;
                        if b == n {
                            matching += 1;
                        }
                    }
                }
                if total == 0 || matching as f64 / total as f64 >= 0.5 {
                    results.push(block.join("\n"));
                }
            }
            break 'outer;
        }
    }
    results
}

/// 9. Every exact occurrence of `old`; with `replace_all` this rewrites
/// them all, without it the duplicates fall through as ambiguous.
fn multi_occurrence_match(content: &str, old: &str) -> Vec<String> {
    if old.is_empty() {
        return vec![];
    }
    let mut results = Vec::new();
    let mut from = 0;
    while let Some(pos) = content[from..].find(old) {
        results.push(old.to_string());
        from += pos + old.len();
    }
    results
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── replace() end-to-end ──────────────────────────────────────────────────

    #[test]
    fn exact_replacement() {
        let c = "fn foo() {}\nfn bar() {}\n";
        let r = replace(c, "fn foo() {}", "fn baz() {}", false).unwrap();
        assert_eq!(r, "fn baz() {}\nfn bar() {}\n");
    }

    #[test]
    fn unique_occurrence_changes_nothing_else() {
        let c = "alpha\nbeta\ngamma\n";
        let r = replace(c, "beta", "BETA", false).unwrap();
        assert_eq!(r, "alpha\nBETA\ngamma\n");
    }

    #[test]
    fn not_found_error() {
        assert_eq!(
            replace("hello world", "missing", "x", false).unwrap_err(),
            EditError::NotFound
        );
    }

    #[test]
    fn multiple_exact_occurrences_are_ambiguous() {
        assert_eq!(
            replace("a b a", "a", "z", false).unwrap_err(),
            EditError::Ambiguous
        );
    }

    #[test]
    fn ambiguous_error_message_asks_for_context() {
        let err = replace("x x", "x", "y", false).unwrap_err();
        assert!(err.to_string().contains("provide more context"));
    }

    #[test]
    fn replace_all_rewrites_every_occurrence() {
        assert_eq!(replace("a b a", "a", "z", true).unwrap(), "z b z");
    }

    #[test]
    fn identical_old_new_is_noop() {
        assert_eq!(replace("x", "x", "x", false).unwrap_err(), EditError::NoOp);
        assert_eq!(replace("x", "x", "x", true).unwrap_err(), EditError::NoOp);
    }

    // ── Line-trimmed strategy ─────────────────────────────────────────────────

    #[test]
    fn line_trimmed_single_line_keeps_file_indentation() {
        let c = "    fn foo() {}\n    fn bar() {}\n";
        let r = replace(c, "fn foo() {}", "fn baz() {}", false).unwrap();
        assert_eq!(r, "    fn baz() {}\n    fn bar() {}\n");
    }

    #[test]
    fn line_trimmed_preserves_original_leading_indentation() {
        // Content indented four spaces deeper than the proposed old string;
        // the replacement shifts by the same delta.
        let content = "    if (x) {\n        return;\n    }";
        let old = "if (x) {\n    return;\n}";
        let new = "if (y) {\n    return;\n}";
        let r = replace(content, old, new, false).unwrap();
        assert_eq!(r, "    if (y) {\n        return;\n    }");
    }

    #[test]
    fn line_trimmed_multi_line_window() {
        let m = line_trimmed_match("  a\n  b\n  c\n", "a\nb\nc");
        assert_eq!(m, vec!["  a\n  b\n  c"]);
    }

    #[test]
    fn line_trimmed_trailing_newline_in_old_is_tolerated() {
        let m = line_trimmed_match("  foo\n", "foo\n");
        assert_eq!(m, vec!["  foo"]);
    }

    #[test]
    fn line_trimmed_no_match_is_empty() {
        assert!(line_trimmed_match("  a\n  b\n", "x\ny").is_empty());
    }

    // ── Levenshtein ───────────────────────────────────────────────────────────

    #[test]
    fn levenshtein_identical_is_zero() {
        assert_eq!(levenshtein("abc", "abc"), 0);
    }

    #[test]
    fn levenshtein_empty_cases() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", ""), 0);
    }

    #[test]
    fn levenshtein_classic_examples() {
        assert_eq!(levenshtein("kitten", "sitten"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn similarity_of_two_empty_strings_is_one() {
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn similarity_is_one_minus_normalized_distance() {
        // distance 3 over max length 7
        let s = similarity("kitten", "sitting");
        assert!((s - (1.0 - 3.0 / 7.0)).abs() < 1e-9, "{s}");
    }

    // ── Block anchor strategy ─────────────────────────────────────────────────

    #[test]
    fn block_anchor_matches_on_anchors_with_fuzzy_interior() {
        let c = "fn foo() {\n    let value = compute();\n    value\n}\nfn bar() {}\n";
        // Interior line differs slightly; anchors are exact.
        let old = "fn foo() {\n    let value = compute_it();\n    value\n}";
        let m = block_anchor_match(c, old);
        assert_eq!(m.len(), 1);
        assert!(m[0].starts_with("fn foo()"));
    }

    #[test]
    fn block_anchor_requires_three_lines() {
        assert!(block_anchor_match("a\nb\n", "a\nb").is_empty());
    }

    #[test]
    fn block_anchor_no_anchor_is_empty() {
        let c = "fn foo() {\n    x\n}\n";
        assert!(block_anchor_match(c, "fn bar() {\n    x\n}").is_empty());
    }

    #[test]
    fn block_anchor_multi_candidate_picks_most_similar() {
        let c = "begin\n    apples\nend\nbegin\n    oranges\nend\n";
        let old = "begin\n    orangutans\nend";
        let m = block_anchor_match(c, old);
        assert_eq!(m.len(), 1);
        assert!(m[0].contains("oranges"), "{m:?}");
    }

    #[test]
    fn block_anchor_multi_candidate_below_threshold_is_empty() {
        let c = "begin\n    aaaaaaaa\nend\nbegin\n    bbbbbbbb\nend\n";
        let old = "begin\n    zzzzzzzz\nend";
        assert!(block_anchor_match(c, old).is_empty());
    }

    #[test]
    fn replace_via_block_anchor() {
        let c = "fn foo() {\n    let x = 1;\n    x\n}\nfn bar() {}\n";
        let old = "fn foo() {\n    let x = 2;\n    x\n}";
        let r = replace(c, old, "fn foo() { 42 }", false).unwrap();
        assert!(r.contains("fn foo() { 42 }"));
        assert!(r.contains("fn bar()"));
    }

    // ── Whitespace-normalized strategy ────────────────────────────────────────

    #[test]
    fn whitespace_normalized_collapses_runs() {
        let r = replace("let   x   =   1;\n", "let x = 1;", "let x = 99;", false).unwrap();
        assert!(r.contains("99"));
    }

    #[test]
    fn whitespace_normalized_word_spacing_within_line() {
        let m = whitespace_normalized_match("call(a,  b)  // trailing", "call(a, b)");
        assert_eq!(m, vec!["call(a,  b)"]);
    }

    #[test]
    fn whitespace_normalized_multi_line() {
        let m = whitespace_normalized_match("a  b\nc  d\n", "a b\nc d");
        assert!(!m.is_empty());
    }

    // ── Indentation-flexible strategy ─────────────────────────────────────────

    #[test]
    fn indentation_flexible_matches_shifted_block() {
        let c = "        let x = 1;\n        let y = 2;\n";
        let old = "    let x = 1;\n    let y = 2;";
        assert!(!indentation_flexible_match(c, old).is_empty());
    }

    #[test]
    fn replace_via_indentation_flexible() {
        let c = "        let x = 1;\n        let y = 2;\n";
        let old = "    let x = 1;\n    let y = 2;";
        let r = replace(c, old, "    let x = 99;\n    let y = 2;", false).unwrap();
        assert!(r.contains("99"));
    }

    #[test]
    fn strip_common_indent_ignores_blank_lines() {
        assert_eq!(strip_common_indent("    a\n\n    b"), "a\n\nb");
    }

    // ── Escape-normalized strategy ────────────────────────────────────────────

    #[test]
    fn unescape_handles_all_recognized_sequences() {
        assert_eq!(unescape(r"a\nb"), "a\nb");
        assert_eq!(unescape(r"a\tb"), "a\tb");
        assert_eq!(unescape(r"a\rb"), "a\rb");
        assert_eq!(unescape(r#"\"quoted\""#), "\"quoted\"");
        assert_eq!(unescape(r"\'q\'"), "'q'");
        assert_eq!(unescape(r"a\\b"), r"a\b");
        assert_eq!(unescape(r"\$HOME"), "$HOME");
        assert_eq!(unescape(r"\`cmd\`"), "`cmd`");
    }

    #[test]
    fn unescape_preserves_unknown_sequences() {
        assert_eq!(unescape(r"a\zb"), r"a\zb");
    }

    #[test]
    fn replace_via_escape_normalized() {
        let c = "msg = \"hello\nworld\";\n";
        let r = replace(c, "msg = \"hello\\nworld\";", "msg = \"bye\";", false).unwrap();
        assert_eq!(r, "msg = \"bye\";\n");
    }

    // ── Trimmed-boundary strategy ─────────────────────────────────────────────

    #[test]
    fn trimmed_boundary_skips_already_trimmed_old() {
        assert!(trimmed_boundary_match("hello\n", "hello").is_empty());
    }

    #[test]
    fn trimmed_boundary_finds_trimmed_form() {
        let m = trimmed_boundary_match("say hello world now\n", "  hello world  ");
        assert_eq!(m, vec!["hello world"]);
    }

    #[test]
    fn old_with_stray_outer_whitespace_still_replaces() {
        let r = replace("hello world\n", "  hello world  ", "goodbye", false).unwrap();
        assert_eq!(r, "goodbye\n");
    }

    // ── Context-aware strategy ────────────────────────────────────────────────

    #[test]
    fn context_aware_accepts_half_matching_interior() {
        let c = "start\nsame line\ndifferent here\nfinish\n";
        let old = "start\nsame line\nsomething else\nfinish";
        let m = context_aware_match(c, old);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn context_aware_rejects_low_interior_match() {
        let c = "START\na\nb\nc\nd\ne\nEND\n";
        let old = "START\n1\n2\n3\n4\n5\nEND";
        assert!(context_aware_match(c, old).is_empty());
    }

    #[test]
    fn context_aware_requires_three_lines() {
        assert!(context_aware_match("a\nb\n", "a\nb").is_empty());
    }

    // ── Multi-occurrence strategy ─────────────────────────────────────────────

    #[test]
    fn multi_occurrence_counts_every_hit() {
        assert_eq!(multi_occurrence_match("ab_ab_ab", "ab").len(), 3);
        assert!(multi_occurrence_match("hello", "xyz").is_empty());
    }

    #[test]
    fn replace_all_rewrites_repeated_token() {
        assert_eq!(
            replace("x = x + x;", "x", "y", true).unwrap(),
            "y = y + y;"
        );
    }

    // ── Strategy precedence ───────────────────────────────────────────────────

    #[test]
    fn exact_beats_line_trimmed_when_both_would_match() {
        // "  hit" exists verbatim and also line-trim-matches "hit"; the
        // exact form must be used so surrounding spacing is kept intact.
        let c = "prefix\n  hit\nsuffix\n";
        let r = replace(c, "  hit", "  replaced", false).unwrap();
        assert_eq!(r, "prefix\n  replaced\nsuffix\n");
    }

    #[test]
    fn later_strategy_resolves_what_exact_finds_ambiguous() {
        // "dup" appears twice verbatim, so the exact strategy skips both
        // occurrences; the line-trimmed window "  dup" is unique and wins,
        // with the replacement shifted to the window's indentation.
        let c = "  dup\nother\ndup\n";
        let r = replace(c, "dup", "DUP", false).unwrap();
        assert_eq!(r, "  DUP\nother\ndup\n");
    }

    #[test]
    fn indent_shift_helpers() {
        assert_eq!(shift_indent("a\n  b", 2), "  a\n    b");
        assert_eq!(shift_indent("  a\n    b", -2), "a\n  b");
        assert_eq!(shift_indent("a\n\nb", 1), " a\n\n b");
        assert_eq!(shift_indent("x", 0), "x");
        assert_eq!(indent_delta("    if (x) {", "if (x) {"), 4);
        assert_eq!(indent_delta("if", "  if"), -2);
    }
}
