//! Aggregate statistics over a chunk sequence.
//!
//! Gives a quick summary of how a template was packed: chunk count, line
//! spans and how many sections and fields ended up in chunks. Printed by the
//! CLI after every run.

use serde::{Deserialize, Serialize};

use crate::models::Chunk;

/// Summary of a chunk sequence. All zero for an empty sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStats {
    pub total_chunks: usize,
    pub avg_lines_per_chunk: usize,
    pub min_lines: usize,
    pub max_lines: usize,
    pub total_sections: usize,
    pub total_fields: usize,
}

impl ChunkStats {
    /// Compute statistics where each chunk covers
    /// `end_line - start_line + 1` lines.
    pub fn compute(chunks: &[Chunk]) -> Self {
        if chunks.is_empty() {
            return Self::default();
        }

        let spans: Vec<usize> = chunks.iter().map(Chunk::line_span).collect();
        let total_lines: usize = spans.iter().sum();

        Self {
            total_chunks: chunks.len(),
            avg_lines_per_chunk: (total_lines as f64 / chunks.len() as f64).round() as usize,
            min_lines: spans.iter().copied().min().unwrap_or(0),
            max_lines: spans.iter().copied().max().unwrap_or(0),
            total_sections: chunks.iter().map(|c| c.content.sections.len()).sum(),
            total_fields: chunks.iter().map(Chunk::field_count).sum(),
        }
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("Chunking stats");
        println!("==============");
        println!("  Chunks:        {}", self.total_chunks);
        println!("  Avg lines:     {}", self.avg_lines_per_chunk);
        println!("  Min lines:     {}", self.min_lines);
        println!("  Max lines:     {}", self.max_lines);
        println!("  Sections:      {}", self.total_sections);
        println!("  Fields:        {}", self.total_fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkContent, Field, Section};

    fn chunk(start: usize, end: usize, fields_per_section: &[usize]) -> Chunk {
        let sections = fields_per_section
            .iter()
            .enumerate()
            .map(|(i, &n)| Section {
                id: format!("s{}", i),
                name: format!("S{}", i),
                description: None,
                tags: None,
                fields: (0..n)
                    .map(|f| Field {
                        id: format!("s{}-f{}", i, f),
                        label: "L".to_string(),
                        field_type: "text".to_string(),
                        description: None,
                        required: None,
                        ai_hints: None,
                        extra: Default::default(),
                    })
                    .collect(),
                extra: Default::default(),
            })
            .collect();

        Chunk {
            id: "chunk-001".to_string(),
            title: "t".to_string(),
            start_line: start,
            end_line: end,
            tags: vec![],
            content: ChunkContent {
                sections,
                context: None,
            },
            embedding: None,
        }
    }

    #[test]
    fn test_empty_is_all_zero() {
        assert_eq!(ChunkStats::compute(&[]), ChunkStats::default());
    }

    #[test]
    fn test_spans_and_totals() {
        let chunks = vec![
            chunk(1, 100, &[3, 2]),
            chunk(1, 250, &[4]),
            chunk(1, 41, &[0, 1, 1]),
        ];
        let stats = ChunkStats::compute(&chunks);
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.min_lines, 41);
        assert_eq!(stats.max_lines, 250);
        assert_eq!(stats.total_sections, 6);
        assert_eq!(stats.total_fields, 11);
        // 391 / 3 = 130.33
        assert_eq!(stats.avg_lines_per_chunk, 130);
    }

    #[test]
    fn test_average_rounds_half_up() {
        let chunks = vec![chunk(1, 10, &[1]), chunk(1, 11, &[1])];
        assert_eq!(ChunkStats::compute(&chunks).avg_lines_per_chunk, 11);
    }

    #[test]
    fn test_spans_use_start_line() {
        let stats = ChunkStats::compute(&[chunk(5, 14, &[1])]);
        assert_eq!(stats.min_lines, 10);
        assert_eq!(stats.max_lines, 10);
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(ChunkStats::default()).unwrap();
        assert_eq!(value["avgLinesPerChunk"], 0);
        assert_eq!(value["totalFields"], 0);
    }
}
