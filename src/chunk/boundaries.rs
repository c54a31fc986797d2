//! Separator detection for chunking

/// Separators tried in order, coarsest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Separator {
    /// Blank line between paragraphs
    Paragraph,
    /// Single line break
    Line,
    /// Space between words
    Word,
}

impl Separator {
    pub const ORDER: [Separator; 3] = [Separator::Paragraph, Separator::Line, Separator::Word];

    pub fn as_str(&self) -> &'static str {
        match self {
            Separator::Paragraph => "\n\n",
            Separator::Line => "\n",
            Separator::Word => " ",
        }
    }
}

/// Split `text[start..end]` at every occurrence of `separator`
///
/// Returns contiguous byte spans covering the whole range; each separator stays
/// attached to the end of the span before it.
pub fn split_spans(text: &str, start: usize, end: usize, separator: Separator) -> Vec<(usize, usize)> {
    let sep = separator.as_str();
    let mut spans = Vec::new();
    let mut span_start = start;

    for (offset, _) in text[start..end].match_indices(sep) {
        let split_at = start + offset + sep.len();
        if split_at > span_start {
            spans.push((span_start, split_at));
            span_start = split_at;
        }
    }

    if span_start < end {
        spans.push((span_start, end));
    }

    spans
}

/// Byte offsets of the first `limit` char boundaries in `(start, end]`
///
/// `end` itself is the last boundary when fewer than `limit` chars remain.
pub fn char_boundaries(text: &str, start: usize, end: usize, limit: usize) -> Vec<usize> {
    let mut boundaries: Vec<usize> = text[start..end]
        .char_indices()
        .skip(1)
        .map(|(i, _)| start + i)
        .take(limit)
        .collect();
    if boundaries.len() < limit {
        boundaries.push(end);
    }
    boundaries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separator_ordering() {
        assert!(Separator::Paragraph < Separator::Line);
        assert!(Separator::Line < Separator::Word);
    }

    #[test]
    fn test_split_spans_cover_range() {
        let text = "one\n\ntwo\n\nthree";
        let spans = split_spans(text, 0, text.len(), Separator::Paragraph);

        assert_eq!(spans, vec![(0, 5), (5, 10), (10, 15)]);
        assert_eq!(&text[spans[0].0..spans[0].1], "one\n\n");
    }

    #[test]
    fn test_split_spans_within_subrange() {
        let text = "xx a b c yy";
        let spans = split_spans(text, 3, 8, Separator::Word);
        assert_eq!(spans, vec![(3, 5), (5, 7), (7, 8)]);
    }

    #[test]
    fn test_char_boundaries_multibyte() {
        let text = "aé b";
        assert_eq!(char_boundaries(text, 0, text.len(), 10), vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_char_boundaries_limit() {
        let text = "abcdef";
        assert_eq!(char_boundaries(text, 1, text.len(), 2), vec![2, 3]);
        assert_eq!(char_boundaries(text, 4, text.len(), 2), vec![5, 6]);
        assert_eq!(char_boundaries(text, 5, text.len(), 2), vec![6]);
    }
}
