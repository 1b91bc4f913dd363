//! Sentence-packing chunker for lessons
//!
//! Deterministic: the same lesson and config always produce the same chunk
//! boundaries and ids (`{lesson_id}-{ordinal}`).

use crate::models::Lesson;

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Maximum characters per chunk
    pub max_chunk_chars: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: 800,
        }
    }
}

/// Chunk text before vectors are attached
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub id: String,
    pub lesson_id: String,
    pub text: String,
    pub tone_tag: String,
    /// Title-prefixed text fed to both the tokenizer and the embedder
    pub indexable_text: String,
}

pub fn chunk_id(lesson_id: &str, ordinal: usize) -> String {
    format!("{}-{}", lesson_id, ordinal)
}

pub struct LessonChunker {
    config: ChunkerConfig,
}

impl LessonChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config: ChunkerConfig {
                max_chunk_chars: config.max_chunk_chars.max(1),
            },
        }
    }

    pub fn split(&self, lesson: &Lesson) -> Vec<ChunkDraft> {
        let mut pieces = self.pack(&split_sentences(&lesson.content));
        if pieces.is_empty() {
            pieces.push(lesson.title.trim().to_string());
        }

        pieces
            .into_iter()
            .enumerate()
            .map(|(ordinal, text)| ChunkDraft {
                id: chunk_id(&lesson.id, ordinal),
                lesson_id: lesson.id.clone(),
                indexable_text: indexable_text(&lesson.title, &text),
                text,
                tone_tag: lesson.tone_tag.clone(),
            })
            .collect()
    }

    /// Greedily pack sentences into chunks of at most `max_chunk_chars`
    fn pack(&self, sentences: &[String]) -> Vec<String> {
        let max = self.config.max_chunk_chars;
        let mut chunks = Vec::new();
        let mut current = String::new();

        for sentence in sentences {
            let len = sentence.chars().count();

            if len > max {
                flush(&mut chunks, &mut current);
                chunks.extend(hard_split(sentence, max));
                continue;
            }

            let current_len = current.chars().count();
            if current_len > 0 && current_len + 1 + len > max {
                flush(&mut chunks, &mut current);
            }

            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        }

        flush(&mut chunks, &mut current);
        chunks
    }
}

impl Default for LessonChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

fn indexable_text(title: &str, text: &str) -> String {
    let title = title.trim();
    if title.is_empty() || title == text {
        text.to_string()
    } else {
        format!("{}\n{}", title, text)
    }
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n')
}

/// Split on sentence terminators; a run of terminators ("...") ends one sentence
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if is_terminator(c) && !chars.peek().is_some_and(|next| is_terminator(*next)) {
            flush(&mut sentences, &mut current);
        }
    }

    flush(&mut sentences, &mut current);
    sentences
}

/// Split an over-long sentence on whitespace. Single words longer than `max` stay whole.
fn hard_split(sentence: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in sentence.split_whitespace() {
        let current_len = current.chars().count();
        if current_len > 0 && current_len + 1 + word.chars().count() > max {
            flush(&mut pieces, &mut current);
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    flush(&mut pieces, &mut current);
    pieces
}

fn flush(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}
