//! Chunker
//!
//! Splits the ordered message sequence into overlapping fixed-size windows.
//! Windows start at `0, step, 2*step, ...` with `step = size - overlap` and
//! stop once a window reaches the last message; the final window may be
//! shorter than `size`.

use super::normalizer::Message;
use crate::error::{Error, Result};

/// A window over the message sequence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk<'a> {
    /// Position of this chunk in processing order
    pub index: usize,
    /// Offset of the first message in the full sequence
    pub start: usize,
    /// The messages in this window
    pub messages: &'a [Message],
}

impl<'a> Chunk<'a> {
    /// Number of messages in the window
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the window is empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Split `messages` into windows of at most `size` messages sharing `overlap`
/// messages with their successor.
pub fn chunk(messages: &[Message], size: usize, overlap: usize) -> Result<Vec<Chunk<'_>>> {
    if size == 0 {
        return Err(Error::Config("chunk size must be at least 1".to_string()));
    }
    if overlap >= size {
        return Err(Error::Config(format!(
            "chunk overlap ({overlap}) must be smaller than chunk size ({size})"
        )));
    }

    let step = size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < messages.len() {
        let end = (start + size).min(messages.len());
        chunks.push(Chunk {
            index: chunks.len(),
            start,
            messages: &messages[start..end],
        });
        if start + size >= messages.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Sender;

    fn messages(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message {
                id: format!("m{i}"),
                sender: Sender::User,
                text: format!("message {i}"),
                conversation_index: 0,
            })
            .collect()
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(chunk(&[], 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_overlap_not_smaller_than_size_is_error() {
        let msgs = messages(5);
        assert!(matches!(chunk(&msgs, 3, 3), Err(Error::Config(_))));
        assert!(matches!(chunk(&msgs, 3, 7), Err(Error::Config(_))));
        assert!(matches!(chunk(&msgs, 0, 0), Err(Error::Config(_))));
    }

    #[test]
    fn test_single_chunk_when_input_fits() {
        let msgs = messages(4);
        let chunks = chunk(&msgs, 10, 3).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4);
    }

    #[test]
    fn test_windows_and_short_tail() {
        let msgs = messages(10);
        let chunks = chunk(&msgs, 4, 1).unwrap();
        let starts: Vec<_> = chunks.iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![0, 3, 6]);
        assert_eq!(chunks[2].len(), 4);

        let chunks = chunk(&msgs, 4, 2).unwrap();
        let starts: Vec<_> = chunks.iter().map(|c| c.start).collect();
        assert_eq!(starts, vec![0, 2, 4, 6]);
        assert_eq!(chunks.last().unwrap().messages.last().unwrap().id, "m9");
    }

    #[test]
    fn test_coverage_and_exact_overlap() {
        for n in 0..30 {
            let msgs = messages(n);
            for size in 1..8 {
                for overlap in 0..size {
                    let chunks = chunk(&msgs, size, overlap).unwrap();

                    let mut covered = vec![false; n];
                    for c in &chunks {
                        assert!(c.len() <= size);
                        for i in c.start..c.start + c.len() {
                            covered[i] = true;
                        }
                    }
                    assert!(covered.iter().all(|&c| c), "n={n} size={size} overlap={overlap}");

                    for pair in chunks.windows(2) {
                        let (a, b) = (pair[0], pair[1]);
                        assert_eq!(a.len(), size);
                        let tail = &a.messages[a.len() - overlap..];
                        let head = &b.messages[..overlap];
                        assert_eq!(tail, head);
                        assert_eq!(b.start, a.start + size - overlap);
                    }
                }
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let msgs = messages(17);
        assert_eq!(chunk(&msgs, 5, 2).unwrap(), chunk(&msgs, 5, 2).unwrap());
    }
}
