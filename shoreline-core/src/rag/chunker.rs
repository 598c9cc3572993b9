//! Text chunking for document ingestion.

/// Splits text into overlapping chunks, respecting UTF-8 character
/// boundaries when a chunk edge would land inside a multi-byte character.
///
/// Overlap carries context across chunk edges so retrieval does not lose
/// sentences cut in half.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    if text.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + chunk_size).min(text.len());
        while end > start && !text.is_char_boundary(end) {
            end -= 1;
        }

        chunks.push(text[start..end].to_string());

        if end == text.len() {
            break;
        }

        // Step forward, keeping `overlap` bytes of the previous chunk.
        let step = chunk_size.saturating_sub(overlap).max(1);
        start += step;
        while start < text.len() && !text.is_char_boundary(start) {
            start += 1;
        }
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("Hello", 10, 2);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn test_chunks_overlap() {
        let chunks = chunk_text("0123456789ABCDEF", 10, 2);
        assert_eq!(chunks, vec!["0123456789", "89ABCDEF"]);
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        assert!(chunk_text("", 10, 2).is_empty());
    }

    #[test]
    fn test_multibyte_boundaries_are_respected() {
        let text = "héllo wörld, ünïcode tëxt hére";
        for chunk in chunk_text(text, 7, 2) {
            // Slicing off a char boundary would have panicked already; make
            // sure the chunks still reassemble into valid pieces of input.
            assert!(text.contains(&chunk));
        }
    }

    #[test]
    fn test_overlap_equal_to_chunk_size_still_advances() {
        let chunks = chunk_text("abcdefgh", 4, 4);
        assert!(chunks.len() <= 8);
        assert_eq!(chunks[0], "abcd");
    }
}
