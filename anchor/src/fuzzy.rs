//! Bounded-edit-distance text search.
//!
//! The fuzzy strategy is the last resort of the resolution cascade: it
//! slides a window of needle length over the haystack and scores each
//! window by normalized Levenshtein similarity. Whitespace runs are
//! collapsed before comparison so that re-rendered documents with different
//! inter-word spacing still match; the window length itself never grows, so
//! a match can never stretch across distances the anchor's context did not
//! cover.

use strsim::normalized_levenshtein;

/// Similarity in `[0, 1]`: `1 - lev(a, b) / max(|a|, |b|)`.
/// Both empty strings are identical (1.0); one empty string shares nothing
/// with a non-empty one (0.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

/// Collapses every run of whitespace into a single space and trims the
/// ends. Comparison-only; never applied to stored text.
pub fn normalize_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_ws = false;
    for c in s.trim().chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}

/// A window of the haystack that matched the needle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FuzzyMatch {
    /// Byte offset of the window start in the haystack.
    pub start: usize,
    /// Byte offset one past the window end.
    pub end: usize,
    /// Window similarity in `[0, 1]`.
    pub score: f64,
    /// Combined similarity of the neighboring text against the provided
    /// context, if context was given.
    pub context_score: Option<f64>,
}

/// Slides a needle-length window over `haystack` and reports the best
/// match with similarity at least `accept`.
///
/// When `context` (before, after) is provided, near-equal windows are
/// tie-broken by how well their neighborhoods match the context; a
/// combined neighborhood similarity of at least `context_accept` counts as
/// a confirmed tie-break.
pub fn find_best_match(
    haystack: &str,
    needle: &str,
    context: Option<(&str, &str)>,
    accept: f64,
    context_accept: f64,
) -> Option<FuzzyMatch> {
    if needle.is_empty() || haystack.is_empty() {
        return None;
    }

    // exact occurrences short-circuit the scan; with context, every exact
    // occurrence competes and the context picks among them
    match context {
        Some(ctx) => {
            let mut best_exact: Option<FuzzyMatch> = None;
            for (pos, _) in haystack.match_indices(needle) {
                let candidate = FuzzyMatch {
                    start: pos,
                    end: pos + needle.len(),
                    score: 1.0,
                    context_score: Some(context_similarity(
                        haystack,
                        pos,
                        pos + needle.len(),
                        ctx,
                    )),
                };
                best_exact = Some(match best_exact {
                    None => candidate,
                    Some(prev) => pick_better(prev, candidate, context_accept),
                });
            }
            if best_exact.is_some() {
                return best_exact;
            }
        }
        None => {
            if let Some(pos) = haystack.find(needle) {
                return Some(FuzzyMatch {
                    start: pos,
                    end: pos + needle.len(),
                    score: 1.0,
                    context_score: None,
                });
            }
        }
    }

    let norm_needle = normalize_whitespace(needle);
    let char_offsets: Vec<usize> = haystack
        .char_indices()
        .map(|(i, _)| i)
        .chain(core::iter::once(haystack.len()))
        .collect();
    let hay_chars = char_offsets.len() - 1;
    let window = needle.chars().count().min(hay_chars);
    if window == 0 {
        return None;
    }

    let mut best: Option<FuzzyMatch> = None;
    for w in 0..=(hay_chars - window) {
        let start = char_offsets[w];
        let end = char_offsets[w + window];
        let score = similarity(&normalize_whitespace(&haystack[start..end]), &norm_needle);
        if score < accept {
            continue;
        }
        let context_score =
            context.map(|ctx| context_similarity(haystack, start, end, ctx));
        let candidate = FuzzyMatch {
            start,
            end,
            score,
            context_score,
        };
        best = Some(match best {
            None => candidate,
            Some(prev) => pick_better(prev, candidate, context_accept),
        });
    }
    best
}

/// Mean similarity of the window's neighborhoods against the recorded
/// before/after context.
fn context_similarity(haystack: &str, start: usize, end: usize, (before, after): (&str, &str)) -> f64 {
    let before_window =
        ceil_char_boundary_slice(haystack, start.saturating_sub(before.len()), start);
    let after_end = (end + after.len()).min(haystack.len());
    let after_window = floor_char_boundary_slice(haystack, end, after_end);
    let sim_before = if before.is_empty() {
        1.0
    } else {
        similarity(
            &normalize_whitespace(before_window),
            &normalize_whitespace(before),
        )
    };
    let sim_after = if after.is_empty() {
        1.0
    } else {
        similarity(
            &normalize_whitespace(after_window),
            &normalize_whitespace(after),
        )
    };
    (sim_before + sim_after) / 2.0
}

// `start..end` may land inside a multi-byte character; nudge the loose end
// to the nearest boundary so slicing cannot panic.
fn floor_char_boundary_slice(s: &str, start: usize, mut end: usize) -> &str {
    while end > start && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[start..end]
}

fn ceil_char_boundary_slice(s: &str, mut start: usize, end: usize) -> &str {
    while start < end && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..end]
}

fn pick_better(a: FuzzyMatch, b: FuzzyMatch, context_accept: f64) -> FuzzyMatch {
    const EPSILON: f64 = 1e-9;
    if (a.score - b.score).abs() > EPSILON {
        return if a.score >= b.score { a } else { b };
    }
    // near-equal window scores: the context decides
    let ctx = |m: &FuzzyMatch| m.context_score.unwrap_or(0.0);
    let (ca, cb) = (ctx(&a), ctx(&b));
    if cb > ca && cb >= context_accept {
        b
    } else {
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similarity_reflexive() {
        for s in ["", "a", "hello world", "многоязычный"] {
            assert_eq!(similarity(s, s), 1.0);
        }
    }

    #[test]
    fn test_similarity_empty_cases() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("", "abc"), 0.0);
    }

    #[test]
    fn test_similarity_single_substitution() {
        // one substitution in a 5-char string
        let s = similarity("hello", "hallo");
        assert!((s - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  a \t b\n\nc  "), "a b c");
        assert_eq!(normalize_whitespace("plain"), "plain");
        assert_eq!(normalize_whitespace(""), "");
    }

    #[test]
    fn test_exact_match_found() {
        let m = find_best_match("the quick brown fox", "quick", None, 0.8, 0.75).unwrap();
        assert_eq!((m.start, m.end), (4, 9));
        assert_eq!(m.score, 1.0);
    }

    #[test]
    fn test_fuzzy_match_tolerates_typo() {
        let m = find_best_match("the qwick brown fox", "quick", None, 0.8, 0.75).unwrap();
        assert_eq!(&"the qwick brown fox"[m.start..m.end], "qwick");
        assert!(m.score >= 0.8);
    }

    #[test]
    fn test_whitespace_differences_tolerated() {
        let m = find_best_match("some  spaced   text here", "spaced text", None, 0.8, 0.75);
        assert!(m.is_some());
    }

    #[test]
    fn test_below_threshold_rejected() {
        assert!(find_best_match("abcdefgh", "zzzzz", None, 0.8, 0.75).is_none());
    }

    #[test]
    fn test_context_breaks_ties() {
        // the needle appears twice; context points at the second occurrence
        let hay = "alpha target beta ... gamma target delta";
        let m = find_best_match(hay, "target", Some(("gamma ", " delta")), 0.8, 0.75).unwrap();
        assert_eq!(&hay[m.start..m.end], "target");
        assert!(m.start > 20, "context should select the later occurrence");
    }

    #[test]
    fn test_needle_longer_than_haystack() {
        let m = find_best_match("ab", "abcdef", None, 0.3, 0.75);
        // degenerate window of haystack length still scores
        assert!(m.is_some());
    }
}
