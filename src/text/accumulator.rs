// Merges streamed partial-text tokens into a running output string
//
// Providers differ in what a "token" is: some send incremental deltas, some
// periodically resend the full text so far. The accumulator detects which
// case applies per token and never lets the observable output become
// shorter without an explicit replace.

/// What the caller should do with the observable output after a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAction {
    /// Extend the output with this delta
    Append(String),
    /// Replace the whole output with this text
    Replace(String),
    /// Duplicate or stale token; leave the output untouched
    Ignore,
}

/// Running merge state for one inference's token stream
#[derive(Debug, Default)]
pub struct StreamTextAccumulator {
    buffer: String,
}

impl StreamTextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current merged text.
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Clear state between sessions.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Merge one incoming token and report the resulting action.
    ///
    /// A token that starts with the current buffer is a full resend of the
    /// text so far (replace); a token the buffer already starts with is a
    /// stale shorter resend (ignore); anything else is an incremental delta
    /// (append).
    pub fn ingest(&mut self, token: &str) -> MergeAction {
        if token.is_empty() {
            return MergeAction::Ignore;
        }

        if self.buffer.is_empty() {
            self.buffer.push_str(token);
            return MergeAction::Append(token.to_string());
        }

        if token == self.buffer {
            return MergeAction::Ignore;
        }

        if token.starts_with(&self.buffer) {
            self.buffer = token.to_string();
            return MergeAction::Replace(token.to_string());
        }

        if self.buffer.starts_with(token) {
            // A resend shorter than what we already have; output never shrinks
            // without an explicit replace.
            return MergeAction::Ignore;
        }

        self.buffer.push_str(token);
        MergeAction::Append(token.to_string())
    }
}
