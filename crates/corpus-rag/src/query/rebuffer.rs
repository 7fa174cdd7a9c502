//! Re-buffering of raw generation fragments into clean output units
//!
//! Backends emit fragments that split words ("The ca", "t sat"). Text is held
//! until the buffer reaches a natural break and released up to that break.
//! Whatever remains is flushed when the generation ends.

/// Characters that end a sentence
fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\u{3002}')
}

/// Buffer state of one answer stream
#[derive(Debug, Default)]
pub struct Rebuffer {
    buf: String,
    /// Held text above this many characters is released at the last space
    max_chars: usize,
}

impl Rebuffer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            buf: String::new(),
            max_chars: max_chars.max(1),
        }
    }

    /// Add a fragment; returns the text that became releasable, if any.
    ///
    /// Release points, checked in order:
    /// 1. the buffer ends in whitespace or sentence punctuation: everything
    /// 2. a sentence end followed by whitespace: through the last such break
    /// 3. the buffer outgrew `max_chars`: through the last whitespace
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        self.buf.push_str(fragment);

        let last = self.buf.chars().next_back()?;
        if last.is_whitespace() || is_sentence_end(last) {
            return self.take_through(self.buf.len());
        }

        if let Some(end) = self.last_sentence_break() {
            return self.take_through(end);
        }

        if self.buf.chars().count() > self.max_chars {
            let end = self
                .buf
                .char_indices()
                .filter(|(_, c)| c.is_whitespace())
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(self.buf.len());
            return self.take_through(end);
        }

        None
    }

    /// Release everything still held
    pub fn finish(&mut self) -> Option<String> {
        self.take_through(self.buf.len())
    }

    /// Byte offset just past the last "sentence end + whitespace" pair
    fn last_sentence_break(&self) -> Option<usize> {
        let mut found = None;
        let mut prev_end = false;
        for (i, c) in self.buf.char_indices() {
            if prev_end && c.is_whitespace() {
                found = Some(i + c.len_utf8());
            }
            prev_end = is_sentence_end(c);
        }
        found
    }

    fn take_through(&mut self, end: usize) -> Option<String> {
        if end == 0 {
            return None;
        }
        let rest = self.buf.split_off(end);
        Some(std::mem::replace(&mut self.buf, rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fragments: &[&str], max_chars: usize) -> Vec<String> {
        let mut rebuffer = Rebuffer::new(max_chars);
        let mut out: Vec<String> = fragments.iter().filter_map(|f| rebuffer.push(f)).collect();
        out.extend(rebuffer.finish());
        out
    }

    #[test]
    fn test_split_word_merged() {
        assert_eq!(run(&["The ca", "t sat"], 1024), vec!["The cat sat"]);
    }

    #[test]
    fn test_release_on_trailing_break() {
        assert_eq!(
            run(&["Hel", "lo ", "wor", "ld."], 1024),
            vec!["Hello ", "world."]
        );
    }

    #[test]
    fn test_release_through_sentence_break() {
        assert_eq!(
            run(&["It rained. The", "n it stopped"], 1024),
            vec!["It rained. ", "Then it stopped"]
        );
    }

    #[test]
    fn test_max_chars_releases_at_whitespace() {
        assert_eq!(run(&["aaaa bb", "bb"], 5), vec!["aaaa ", "bbbb"]);
        assert_eq!(run(&["abcdefgh"], 4), vec!["abcdefgh"]);
    }

    #[test]
    fn test_empty_fragments_and_finish() {
        let mut rebuffer = Rebuffer::new(16);
        assert_eq!(rebuffer.push(""), None);
        assert_eq!(rebuffer.finish(), None);
    }

    #[test]
    fn test_concatenation_preserved() {
        let fragments = ["Ro", "ses are", " red.", " Vio", "lets", " are blue"];
        assert_eq!(run(&fragments, 8).concat(), fragments.concat());
    }
}
