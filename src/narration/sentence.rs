//! Sentence splitting for narration.
//!
//! Synthesis is requested one sentence at a time, so splitting decides both
//! request granularity and playback cadence.

/// Split plain text into sentences on terminal punctuation.
///
/// `.`, `!`, and `?` end a sentence and stay attached to it. A trailing
/// fragment without terminal punctuation becomes its own sentence. Fragments
/// with nothing speakable in them (empty or punctuation-only) are dropped.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            push_fragment(&mut sentences, &current);
            current.clear();
        }
    }
    push_fragment(&mut sentences, &current);

    sentences
}

fn push_fragment(sentences: &mut Vec<String>, fragment: &str) {
    let trimmed = fragment.trim();
    if trimmed.is_empty() || !trimmed.chars().any(char::is_alphanumeric) {
        return;
    }
    sentences.push(trimmed.to_owned());
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences = split_sentences("Revenue is up. Expenses are flat! Any questions?");
        assert_eq!(
            sentences,
            vec!["Revenue is up.", "Expenses are flat!", "Any questions?"]
        );
    }

    #[test]
    fn trailing_fragment_is_kept() {
        let sentences = split_sentences("First sentence. And a trailing thought");
        assert_eq!(sentences, vec!["First sentence.", "And a trailing thought"]);
    }

    #[test]
    fn punctuation_only_fragments_are_dropped() {
        let sentences = split_sentences("Wait... what?");
        assert_eq!(sentences, vec!["Wait.", "what?"]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
        assert!(split_sentences("...").is_empty());
    }

    #[test]
    fn single_unterminated_sentence() {
        assert_eq!(split_sentences("hello there"), vec!["hello there"]);
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(
            split_sentences("  One.   Two.  "),
            vec!["One.", "Two."]
        );
    }
}
