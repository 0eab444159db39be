//! Memoization of grids by their defining configuration.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{GridConfig, GridData, TranscriptionScheme};
use crate::error::TranscriptionResult;

/// Hashable form of a [`GridConfig`]. Orders are expanded per segment and
/// segment ends are compared by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridKey {
    num_segments: usize,
    orders: Vec<usize>,
    segment_ends: Option<Vec<u64>>,
    scheme: TranscriptionScheme,
    compressed: bool,
}

impl GridKey {
    pub fn from_config(config: &GridConfig) -> TranscriptionResult<Self> {
        Ok(Self {
            num_segments: config.num_segments,
            orders: config.transcription_order.per_segment(config.num_segments)?,
            segment_ends: config
                .segment_ends
                .as_ref()
                .map(|ends| ends.iter().map(|v| v.to_bits()).collect()),
            scheme: config.scheme,
            compressed: config.compressed,
        })
    }
}

#[derive(Debug, Default)]
pub struct GridCache {
    grids: HashMap<GridKey, Arc<GridData>>,
}

impl GridCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the grid for `config`, building it on first request.
    pub fn get_or_build(&mut self, config: &GridConfig) -> TranscriptionResult<Arc<GridData>> {
        let key = GridKey::from_config(config)?;
        if let Some(existing) = self.grids.get(&key) {
            return Ok(Arc::clone(existing));
        }
        let grid = Arc::new(GridData::new(config.clone())?);
        debug!(entries = self.grids.len() + 1, "caching new grid");
        self.grids.insert(key, Arc::clone(&grid));
        Ok(grid)
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}
