//! Word splitting for the text pre-pass
//!
//! Text nodes are rewritten into one inline span per word so that individual
//! words become bodies. Whitespace runs stay as plain text between them.

/// A piece of a text node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRun<'a> {
    Word(&'a str),
    Space(&'a str),
}

/// Tags whose text is never split
pub const UNSPLIT_TAGS: [&str; 5] = ["script", "style", "textarea", "pre", "code"];

/// Whether a text node is worth splitting at all
pub fn is_splittable(text: &str) -> bool {
    !text.trim().is_empty()
}

/// Split text into alternating word and whitespace runs, in order
pub fn split_words(text: &str) -> Vec<TextRun<'_>> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut in_space: Option<bool> = None;

    for (idx, ch) in text.char_indices() {
        let space = ch.is_whitespace();
        match in_space {
            Some(prev) if prev != space => {
                runs.push(make_run(&text[start..idx], prev));
                start = idx;
            }
            _ => {}
        }
        in_space = Some(space);
    }

    if let Some(space) = in_space {
        runs.push(make_run(&text[start..], space));
    }
    runs
}

fn make_run(slice: &str, space: bool) -> TextRun<'_> {
    if space {
        TextRun::Space(slice)
    } else {
        TextRun::Word(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words_keeps_whitespace_runs() {
        let runs = split_words("  hello  big\nworld");
        assert_eq!(
            runs,
            vec![
                TextRun::Space("  "),
                TextRun::Word("hello"),
                TextRun::Space("  "),
                TextRun::Word("big"),
                TextRun::Space("\n"),
                TextRun::Word("world"),
            ]
        );
    }

    #[test]
    fn test_split_words_unicode() {
        let runs = split_words("héllo wörld");
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0], TextRun::Word("héllo"));
        assert_eq!(runs[2], TextRun::Word("wörld"));
    }

    #[test]
    fn test_whitespace_only_is_not_splittable() {
        assert!(!is_splittable(" \n\t"));
        assert!(is_splittable(" a "));
        assert!(split_words("").is_empty());
    }
}
