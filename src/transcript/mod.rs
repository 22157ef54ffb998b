//! Transcript handling: input documents, normalization, chunking
//!
//! Raw conversation exports are flattened into an ordered `Message`
//! sequence, then windowed into overlapping `Chunk`s for extraction.

pub mod chunker;
pub mod normalizer;
pub mod source;

pub use chunker::{chunk, Chunk};
pub use normalizer::{normalize, synthetic_id, Conversation, Message, RawEntry, Sender};
pub use source::{load_file, DirectorySource, MemorySource, TranscriptSource};
