// Local post-processing of final inference text
//
// Dedupes stuttered ASR fragments, applies mode-specific formatting and
// provides the normalized "effectively unchanged" comparison shared by the
// quality-refinement pass and the rewrite-unchanged diagnostic log.

use crate::session::WorkflowMode;

/// Longest run of words considered when collapsing immediate repeats
const MAX_PHRASE_LEN: usize = 8;

/// Collapse immediately repeated word runs ("so I I I think", "and then and
/// then we left"). Longer runs are collapsed before shorter ones so a
/// repeated phrase is removed as a unit rather than word by word.
pub fn dedupe_repeated_phrases(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 2 {
        return words.join(" ");
    }

    let mut kept: Vec<&str> = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        kept.push(words[i]);
        i += 1;

        let mut n = MAX_PHRASE_LEN.min(kept.len());
        while n >= 1 {
            if kept.len() >= n && i + n <= words.len() {
                let tail = &kept[kept.len() - n..];
                let ahead = &words[i..i + n];
                if phrase_eq(tail, ahead) {
                    // Skip the repeat and retry at the same length in case
                    // the phrase is stuttered more than twice
                    i += n;
                    continue;
                }
            }
            n -= 1;
        }
    }

    kept.join(" ")
}

fn phrase_eq(a: &[&str], b: &[&str]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|(x, y)| x.eq_ignore_ascii_case(y))
}

/// Mode-specific formatting of the final output text.
///
/// Dictation output is inserted inline, so interior whitespace collapses to
/// single spaces. Ask/translate output may be multi-line; interior newlines
/// are preserved and only the edges are trimmed.
pub fn finalize_output(mode: WorkflowMode, text: &str) -> String {
    match mode {
        WorkflowMode::Dictate => text.split_whitespace().collect::<Vec<_>>().join(" "),
        WorkflowMode::Ask | WorkflowMode::Translate => {
            let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
            let start = lines.iter().position(|l| !l.is_empty()).unwrap_or(0);
            let end = lines.iter().rposition(|l| !l.is_empty()).map_or(0, |p| p + 1);
            lines[start..end].join("\n")
        }
    }
}

/// Rule for the "effectively unchanged" text comparison.
///
/// The exact rule is heuristic, not load-bearing; callers hold it as a value
/// so it can be adjusted without touching the comparison sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NormalizationRule {
    pub trim: bool,
    pub collapse_whitespace: bool,
    pub casefold: bool,
}

impl Default for NormalizationRule {
    fn default() -> Self {
        Self {
            trim: true,
            collapse_whitespace: true,
            casefold: true,
        }
    }
}

/// Normalize text for the unchanged comparison under the given rule.
pub fn normalized_for_comparison(text: &str, rule: NormalizationRule) -> String {
    let mut out = if rule.collapse_whitespace {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    } else if rule.trim {
        text.trim().to_string()
    } else {
        text.to_string()
    };
    if rule.casefold {
        out = out.to_lowercase();
    }
    out
}

/// True when two outputs are the same after normalization.
pub fn effectively_unchanged(a: &str, b: &str, rule: NormalizationRule) -> bool {
    normalized_for_comparison(a, rule) == normalized_for_comparison(b, rule)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_single_word_stutter() {
        assert_eq!(
            dedupe_repeated_phrases("so I I think"),
            "so I think"
        );
    }

    #[test]
    fn test_dedupe_phrase_repeat() {
        assert_eq!(
            dedupe_repeated_phrases("and then and then we left"),
            "and then we left"
        );
    }

    #[test]
    fn test_dedupe_triple_stutter() {
        assert_eq!(dedupe_repeated_phrases("I I I think"), "I think");
    }

    #[test]
    fn test_dedupe_is_case_insensitive() {
        assert_eq!(dedupe_repeated_phrases("Hello hello world"), "Hello world");
    }

    #[test]
    fn test_dedupe_keeps_intentional_repetition_apart() {
        // Non-adjacent repeats stay
        assert_eq!(
            dedupe_repeated_phrases("one two one two three one"),
            "one two three one"
        );
    }

    #[test]
    fn test_dedupe_empty_and_single() {
        assert_eq!(dedupe_repeated_phrases(""), "");
        assert_eq!(dedupe_repeated_phrases("word"), "word");
    }

    #[test]
    fn test_finalize_dictate_collapses_whitespace() {
        assert_eq!(
            finalize_output(WorkflowMode::Dictate, "  Hello\n  world  "),
            "Hello world"
        );
    }

    #[test]
    fn test_finalize_ask_preserves_interior_newlines() {
        assert_eq!(
            finalize_output(WorkflowMode::Ask, "\nFirst line\n\nSecond line\n\n"),
            "First line\n\nSecond line"
        );
    }

    #[test]
    fn test_finalize_translate_trims_edges() {
        assert_eq!(
            finalize_output(WorkflowMode::Translate, "  你好世界  "),
            "你好世界"
        );
    }

    #[test]
    fn test_whitespace_only_difference_is_unchanged() {
        // "Hello world" vs "hello   world" normalize to the same string
        assert!(effectively_unchanged(
            "Hello world",
            "hello   world",
            NormalizationRule::default()
        ));
    }

    #[test]
    fn test_punctuation_difference_is_a_change() {
        assert!(!effectively_unchanged(
            "Hello world",
            "Hello, world.",
            NormalizationRule::default()
        ));
    }

    #[test]
    fn test_rule_without_casefold_sees_case_changes() {
        let rule = NormalizationRule {
            casefold: false,
            ..NormalizationRule::default()
        };
        assert!(!effectively_unchanged("Hello", "hello", rule));
    }

    #[test]
    fn test_normalization_handles_non_latin_text() {
        assert!(effectively_unchanged(
            "こんにちは 世界",
            "こんにちは  世界",
            NormalizationRule::default()
        ));
    }
}
