//! Batch Planning for Bulk Ingestion
//!
//! An input of `N` records is cut into chunks and waves before anything is
//! written:
//!
//! ```text
//! records  0 ............................................. N-1
//!          │── chunk 0 ──│── chunk 1 ──│── chunk 2 ──│ ...      (≤ C records)
//!          │────────── wave 0 ─────────│── wave 1 ───│ ...      (≤ S chunks)
//!                offset 0                  offset D
//! ```
//!
//! Every chunk except possibly the last holds exactly `C` records, and every
//! wave except possibly the last holds exactly `S` chunks. Waves carry the
//! dispatch offset they were planned for (`index × D`); the pipeline may
//! start a wave later than planned, never earlier.
//!
//! Planning is index based and pure: the same `(N, C, S)` always yields the
//! same plan.

use crate::error::{ClientError, Result};
use serde::Serialize;
use std::ops::Range;
use std::time::Duration;

/// A contiguous run of at most `C` records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position of the chunk across the whole batch
    pub index: usize,
    /// Record indexes covered by the chunk
    pub records: Range<usize>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Up to `S` chunks dispatched together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wave {
    pub index: usize,
    pub chunks: Vec<Chunk>,
    /// Planned dispatch time relative to the first wave
    pub offset: Duration,
}

impl Wave {
    /// Number of records across the wave's chunks
    pub fn record_count(&self) -> usize {
        self.chunks.iter().map(Chunk::len).sum()
    }
}

/// Chunk and wave plan for one ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionBatch {
    pub total_records: usize,
    pub chunk_size: usize,
    pub wave_size: usize,
    pub waves: Vec<Wave>,
}

impl IngestionBatch {
    /// Plan `total_records` records into chunks of `chunk_size` and waves of
    /// `wave_size` chunks spaced `wave_delay` apart.
    pub fn plan(
        total_records: usize,
        chunk_size: usize,
        wave_size: usize,
        wave_delay: Duration,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ClientError::ConfigError(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if wave_size == 0 {
            return Err(ClientError::ConfigError(
                "wave_size must be at least 1".to_string(),
            ));
        }

        let chunks: Vec<Chunk> = (0..total_records)
            .step_by(chunk_size)
            .enumerate()
            .map(|(index, start)| Chunk {
                index,
                records: start..(start + chunk_size).min(total_records),
            })
            .collect();

        let waves = chunks
            .chunks(wave_size)
            .enumerate()
            .map(|(index, group)| Wave {
                index,
                chunks: group.to_vec(),
                offset: wave_delay.saturating_mul(index as u32),
            })
            .collect();

        Ok(Self {
            total_records,
            chunk_size,
            wave_size,
            waves,
        })
    }

    pub fn chunk_count(&self) -> usize {
        self.waves.iter().map(|w| w.chunks.len()).sum()
    }

    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    /// Sizes of every chunk in order
    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks().map(Chunk::len).collect()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.waves.iter().flat_map(|w| w.chunks.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_2500_records() {
        let batch = IngestionBatch::plan(2500, 1000, 2, Duration::from_secs(30)).unwrap();

        assert_eq!(batch.chunk_sizes(), vec![1000, 1000, 500]);
        assert_eq!(batch.wave_count(), 2);

        let waves: Vec<Vec<usize>> = batch
            .waves
            .iter()
            .map(|w| w.chunks.iter().map(|c| c.index).collect())
            .collect();
        assert_eq!(waves, vec![vec![0, 1], vec![2]]);

        assert_eq!(batch.waves[0].offset, Duration::ZERO);
        assert_eq!(batch.waves[1].offset, Duration::from_secs(30));
        assert_eq!(batch.waves[1].chunks[0].records, 2000..2500);
    }

    #[test]
    fn test_plan_exact_multiple() {
        let batch = IngestionBatch::plan(3000, 1000, 30, Duration::ZERO).unwrap();
        assert_eq!(batch.chunk_sizes(), vec![1000, 1000, 1000]);
        assert_eq!(batch.wave_count(), 1);
        assert_eq!(batch.waves[0].record_count(), 3000);
    }

    #[test]
    fn test_plan_zero_records() {
        let batch = IngestionBatch::plan(0, 1000, 30, Duration::from_secs(30)).unwrap();
        assert_eq!(batch.chunk_count(), 0);
        assert_eq!(batch.wave_count(), 0);
    }

    #[test]
    fn test_plan_smaller_than_one_chunk() {
        let batch = IngestionBatch::plan(7, 1000, 30, Duration::from_secs(30)).unwrap();
        assert_eq!(batch.chunk_sizes(), vec![7]);
    }

    #[test]
    fn test_plan_rejects_zero_sizes() {
        assert!(matches!(
            IngestionBatch::plan(10, 0, 1, Duration::ZERO),
            Err(ClientError::ConfigError(_))
        ));
        assert!(matches!(
            IngestionBatch::plan(10, 1, 0, Duration::ZERO),
            Err(ClientError::ConfigError(_))
        ));
    }

    #[test]
    fn test_chunks_cover_every_record_once() {
        let batch = IngestionBatch::plan(1234, 100, 3, Duration::from_millis(5)).unwrap();
        let mut next = 0;
        for chunk in batch.chunks() {
            assert_eq!(chunk.records.start, next);
            assert!(chunk.len() <= 100);
            next = chunk.records.end;
        }
        assert_eq!(next, 1234);
        assert!(batch.waves.iter().all(|w| w.chunks.len() <= 3));
    }
}
