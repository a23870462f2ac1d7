#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Catalog, ToolRecord};
use crate::{Result, ToolsyError};

/// A window of one tool record's composed text, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Identifier of the owning tool record
    pub tool_id: String,
    /// Display name of the owning tool
    pub name: String,
    /// Provenance URL of the owning tool
    pub source: String,
    /// Position of this chunk within its record
    pub chunk_index: usize,
    pub text: String,
}

impl Chunk {
    /// Stable identifier, unique within one catalog
    #[inline]
    pub fn id(&self) -> String {
        format!("{}#{}", self.tool_id, self.chunk_index)
    }
}

/// Configuration for text chunking, measured in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks of the same record
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Breakpoint {
    Paragraph,
    Line,
    Sentence,
    Word,
}

impl Breakpoint {
    const PREFERENCE: [Self; 4] = [Self::Paragraph, Self::Line, Self::Sentence, Self::Word];

    /// Whether a window may end right before `chars[end]`
    fn allows_end(self, chars: &[char], end: usize) -> bool {
        let last = chars[end - 1];
        match self {
            Self::Paragraph => last == '\n' && end >= 2 && chars[end - 2] == '\n',
            Self::Line => last == '\n',
            Self::Sentence => {
                last.is_whitespace() && end >= 2 && matches!(chars[end - 2], '.' | '!' | '?')
            }
            Self::Word => last.is_whitespace(),
        }
    }
}

/// Split one record's text into overlapping windows.
///
/// Windows hold at most `chunk_size` characters and consecutive windows share exactly
/// `overlap` characters. A window that does not reach the end of the text ends at the
/// latest paragraph, line, sentence or word boundary in its second half, in that order of
/// preference, or is cut hard at `chunk_size` when there is none.
#[inline]
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    if chunk_size == 0 {
        return Err(ToolsyError::Config(
            "Chunk size must be greater than zero".to_string(),
        ));
    }
    if overlap >= chunk_size {
        return Err(ToolsyError::Config(format!(
            "Chunk overlap ({}) must be smaller than chunk size ({})",
            overlap, chunk_size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut windows = Vec::new();
    let mut start = 0;

    while start < total {
        let limit = start + chunk_size;
        if limit >= total {
            windows.push(chars[start..].iter().collect());
            break;
        }

        let end = window_end(&chars, start, limit, overlap);
        windows.push(chars[start..end].iter().collect());
        start = end - overlap;
    }

    Ok(windows)
}

fn window_end(chars: &[char], start: usize, limit: usize, overlap: usize) -> usize {
    // Never earlier than overlap + 1 so every window advances
    let earliest = start + ((limit - start) / 2).max(overlap + 1);

    Breakpoint::PREFERENCE
        .iter()
        .find_map(|kind| {
            (earliest..=limit)
                .rev()
                .find(|&end| kind.allows_end(chars, end))
        })
        .unwrap_or(limit)
}

/// Chunk a single tool record
#[inline]
pub fn chunk_record(record: &ToolRecord, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let windows = split_text(&record.text_content, config.chunk_size, config.chunk_overlap)?;

    Ok(windows
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            tool_id: record.id.clone(),
            name: record.name.clone(),
            source: record.source.clone(),
            chunk_index,
            text,
        })
        .collect())
}

/// Chunk every record of the catalog, in catalog order
#[inline]
pub fn chunk_catalog(catalog: &Catalog, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for record in catalog {
        chunks.extend(chunk_record(record, config)?);
    }

    debug!(
        "Chunked {} tools into {} chunks (size {}, overlap {})",
        catalog.len(),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    Ok(chunks)
}
