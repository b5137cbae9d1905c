//! Lossless sentence segmentation
//!
//! Sentence boundaries are found with punctuation heuristics; every byte
//! of the input lands in exactly one sentence (trailing whitespace belongs
//! to the sentence it follows), so concatenating the returned slices
//! reproduces the input exactly. The chunkers rely on that property for
//! their coverage guarantee.

/// Split text into sentences, losslessly
///
/// A boundary is a run of `.`, `!` or `?` (plus any closing quotes or
/// brackets) followed by whitespace or end of input. Decimal points and
/// abbreviations followed immediately by a letter do not end a sentence.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();

    while let Some((_, ch)) = iter.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        // Absorb consecutive terminators and closing punctuation
        while let Some(&(_, next)) = iter.peek() {
            if matches!(
                next,
                '.' | '!' | '?' | '"' | '\'' | ')' | ']' | '\u{201d}' | '\u{2019}'
            ) {
                iter.next();
            } else {
                break;
            }
        }
        // A boundary needs trailing whitespace (or end of input); the
        // whitespace run stays attached to the finished sentence
        let mut saw_whitespace = false;
        while let Some(&(_, next)) = iter.peek() {
            if next.is_whitespace() {
                saw_whitespace = true;
                iter.next();
            } else {
                break;
            }
        }
        let boundary = iter.peek().map_or(text.len(), |&(idx, _)| idx);
        if saw_whitespace || boundary == text.len() {
            if boundary > start {
                sentences.push(&text[start..boundary]);
            }
            start = boundary;
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminators() {
        let sentences = split_sentences("First one. Second one! Third one?");
        assert_eq!(sentences.len(), 3);
        assert_eq!(sentences[0], "First one. ");
        assert_eq!(sentences[1], "Second one! ");
        assert_eq!(sentences[2], "Third one?");
    }

    #[test]
    fn concatenation_is_lossless() {
        let text = "Dr. Smith arrived.  He said \"stop!\" (loudly.) Then he left...\n\nNew paragraph. 3.14 is pi.";
        let sentences = split_sentences(text);
        assert_eq!(sentences.concat(), text);
    }

    #[test]
    fn decimal_points_do_not_split() {
        let sentences = split_sentences("The value is 3.14159 exactly. Next sentence.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].contains("3.14159"));
    }

    #[test]
    fn closing_quotes_stay_with_their_sentence() {
        let sentences = split_sentences("He said \"go.\" She left.");
        assert_eq!(sentences.len(), 2);
        assert_eq!(sentences[0], "He said \"go.\" ");
    }

    #[test]
    fn unterminated_text_is_one_sentence() {
        let sentences = split_sentences("no terminator here");
        assert_eq!(sentences, vec!["no terminator here"]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(split_sentences("").is_empty());
    }
}
