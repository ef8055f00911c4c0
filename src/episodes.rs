//! Episode windows over a date range and their deterministic train/eval split.

use crate::error::EpisodeError;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::info;

/// One fixed-length window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Episode {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Episode {
    /// Bounds as exchange-native millisecond timestamps.
    pub fn bounds_ms(&self) -> (i64, i64) {
        (self.start.timestamp_millis(), self.end.timestamp_millis())
    }
}

/// Partition an episode is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatasetLabel {
    Training,
    Eval,
}

impl DatasetLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetLabel::Training => "training",
            DatasetLabel::Eval => "eval",
        }
    }
}

impl fmt::Display for DatasetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Episodes grouped by label, each in chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeSplit {
    pub training: Vec<Episode>,
    pub eval: Vec<Episode>,
}

impl EpisodeSplit {
    pub fn get(&self, label: DatasetLabel) -> &[Episode] {
        match label {
            DatasetLabel::Training => &self.training,
            DatasetLabel::Eval => &self.eval,
        }
    }

    pub fn len(&self) -> usize {
        self.training.len() + self.eval.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Slide a `data_length` window across `[start, end)` in `data_step` increments.
/// Yields `floor((end - start - data_length) / data_step) + 1` episodes, or none
/// if the range cannot hold a single one.
pub fn sliding_episodes(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    data_length: Duration,
    data_step: Duration,
) -> Result<Vec<Episode>, EpisodeError> {
    if data_length <= Duration::zero() {
        return Err(EpisodeError::InvalidDuration { name: "data_length" });
    }
    if data_step <= Duration::zero() {
        return Err(EpisodeError::InvalidDuration { name: "data_step" });
    }

    let mut episodes = Vec::new();
    let mut episode_start = start;
    // stops at the end of the range or at the last representable datetime
    while let Some(episode_end) = episode_start.checked_add_signed(data_length) {
        if episode_end > end {
            break;
        }
        episodes.push(Episode {
            start: episode_start,
            end: episode_end,
        });
        match episode_start.checked_add_signed(data_step) {
            Some(next) => episode_start = next,
            None => break,
        }
    }
    Ok(episodes)
}

/// Label an episode from the CRC32 of its start timestamp in microseconds.
///
/// The checksum is uniform over `u32`, so roughly `1 - split_ratio` of the
/// episodes land in eval. Same episode and ratio always give the same label.
pub fn assign_split(episode: &Episode, split_ratio: f64) -> DatasetLabel {
    let micros = episode.start.timestamp_micros();
    let checksum = crc32fast::hash(&micros.to_le_bytes());
    let eval_threshold = (1.0 - split_ratio) * 2f64.powi(32);
    if (checksum as f64) < eval_threshold {
        DatasetLabel::Eval
    } else {
        DatasetLabel::Training
    }
}

/// Route every episode with [`assign_split`], keeping chronological order.
pub fn split_episodes(
    episodes: &[Episode],
    split_ratio: f64,
) -> Result<EpisodeSplit, EpisodeError> {
    if !(0.0..=1.0).contains(&split_ratio) {
        return Err(EpisodeError::InvalidSplitRatio(split_ratio));
    }

    let mut split = EpisodeSplit::default();
    for episode in episodes {
        match assign_split(episode, split_ratio) {
            DatasetLabel::Training => split.training.push(*episode),
            DatasetLabel::Eval => split.eval.push(*episode),
        }
    }

    info!(
        episodes = episodes.len(),
        training = split.training.len(),
        eval = split.eval.len(),
        "split episodes"
    );
    Ok(split)
}
