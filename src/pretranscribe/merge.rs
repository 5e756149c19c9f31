// Transcript merging across chunk boundaries
//
// Consecutive chunks share an overlap region, so the words at a boundary
// usually appear in both transcripts. The merger drops the duplicated
// prefix by exact word match first, then by fuzzy match; whenever it has
// to guess (fuzzy or no overlap found) the low-confidence counter grows.

use strsim::jaro_winkler;

/// Longest word overlap considered at a chunk boundary
const MAX_OVERLAP_WORDS: usize = 8;

/// Per-word similarity above which two boundary words are the same word
/// heard twice
const FUZZY_WORD_THRESHOLD: f64 = 0.85;

/// Merges chunk transcripts in emission order
pub struct TranscriptMerger {
    text: String,
    expect_overlap: bool,
    low_confidence_merges: u32,
}

impl TranscriptMerger {
    /// `expect_overlap` is true when chunks were cut with a shared audio
    /// tail; without it a plain join is correct and never counts as a guess.
    pub fn new(expect_overlap: bool) -> Self {
        Self {
            text: String::new(),
            expect_overlap,
            low_confidence_merges: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn low_confidence_merges(&self) -> u32 {
        self.low_confidence_merges
    }

    /// Merge the next chunk transcript.
    pub fn push(&mut self, chunk_text: &str) {
        let chunk_text = chunk_text.trim();
        if chunk_text.is_empty() {
            return;
        }
        if self.text.is_empty() {
            self.text = chunk_text.to_string();
            return;
        }
        if !self.expect_overlap {
            self.text.push(' ');
            self.text.push_str(chunk_text);
            return;
        }

        let tail: Vec<&str> = self
            .text
            .split_whitespace()
            .rev()
            .take(MAX_OVERLAP_WORDS)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let chunk_words: Vec<&str> = chunk_text.split_whitespace().collect();
        let max_n = tail.len().min(chunk_words.len()).min(MAX_OVERLAP_WORDS);

        // Exact boundary match, longest first
        for n in (1..=max_n).rev() {
            if words_match(&tail[tail.len() - n..], &chunk_words[..n], false) {
                self.append_words(&chunk_words[n..]);
                return;
            }
        }

        // Fuzzy boundary match: the same words heard slightly differently
        for n in (1..=max_n).rev() {
            if words_match(&tail[tail.len() - n..], &chunk_words[..n], true) {
                self.low_confidence_merges += 1;
                self.append_words(&chunk_words[n..]);
                return;
            }
        }

        // No overlap found where one was expected
        self.low_confidence_merges += 1;
        self.append_words(&chunk_words);
    }

    fn append_words(&mut self, words: &[&str]) {
        if words.is_empty() {
            return;
        }
        self.text.push(' ');
        self.text.push_str(&words.join(" "));
    }
}

fn words_match(a: &[&str], b: &[&str], fuzzy: bool) -> bool {
    if a.len() != b.len() || a.is_empty() {
        return false;
    }
    a.iter().zip(b.iter()).all(|(x, y)| {
        let x = normalize_word(x);
        let y = normalize_word(y);
        if fuzzy {
            jaro_winkler(&x, &y) >= FUZZY_WORD_THRESHOLD
        } else {
            x == y
        }
    })
}

/// Strip punctuation and case for boundary comparison only; the merged
/// text keeps the original spelling.
fn normalize_word(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}
