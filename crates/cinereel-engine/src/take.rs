//! The saved artifact of a recording.
//!
//! A [`Take`] is the set of [`ActionStream`]s a recording kept, plus its
//! length and a BLAKE3 content hash. The hash covers the canonical JSON of
//! everything except itself, so a take that was edited or truncated on disk
//! is detected on load.
//!
//! Loading is lenient: [`Take::from_json_lenient`] drops malformed actions
//! and streams instead of rejecting the whole document, and reports what it
//! dropped in a [`LoadReport`].

use serde::{Deserialize, Serialize};

use cinereel_capture::recording::SaveTarget;
use cinereel_log::stream::{ActionStream, LogicalId};

// ---------------------------------------------------------------------------
// Take
// ---------------------------------------------------------------------------

/// A finished, replayable recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Take {
    pub name: String,
    /// Number of ticks the recording ran for.
    pub total_ticks: u64,
    /// Streams in logical id order; the master is first.
    pub streams: Vec<ActionStream>,
    /// BLAKE3 hex digest over `name`, `total_ticks` and `streams`.
    #[serde(default)]
    pub hash: String,
}

/// What [`Take::from_json_lenient`] had to drop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub dropped_actions: usize,
    pub dropped_streams: usize,
    /// Whether the stored hash matched the content as stored.
    pub hash_verified: bool,
}

impl LoadReport {
    /// Whether the document loaded without losing anything.
    pub fn is_clean(&self) -> bool {
        self.dropped_actions == 0 && self.dropped_streams == 0 && self.hash_verified
    }
}

/// Compute the BLAKE3 hex digest of the hashable take content.
fn compute_hash(name: &str, total_ticks: u64, streams: &[ActionStream]) -> Result<String, anyhow::Error> {
    #[derive(Serialize)]
    struct HashableTake<'a> {
        name: &'a str,
        total_ticks: u64,
        streams: &'a [ActionStream],
    }

    let json_bytes = serde_json::to_vec(&HashableTake {
        name,
        total_ticks,
        streams,
    })?;
    Ok(blake3::hash(&json_bytes).to_hex().to_string())
}

impl Take {
    /// An empty, unsealed take.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            total_ticks: 0,
            streams: Vec::new(),
            hash: String::new(),
        }
    }

    pub fn stream(&self, id: LogicalId) -> Option<&ActionStream> {
        self.streams.iter().find(|s| s.logical_id == id)
    }

    pub fn master(&self) -> Option<&ActionStream> {
        self.stream(LogicalId::MASTER)
    }

    /// Total number of actions across all streams.
    pub fn action_count(&self) -> usize {
        self.streams.iter().map(|s| s.actions().len()).sum()
    }

    /// Recompute and store the content hash.
    pub fn seal(&mut self) -> Result<(), anyhow::Error> {
        self.hash = compute_hash(&self.name, self.total_ticks, &self.streams)?;
        Ok(())
    }

    /// Check the stored hash and every stream invariant.
    ///
    /// # Errors
    ///
    /// Returns an error if the hash does not match the content or a stream
    /// violates its invariant.
    pub fn verify(&self) -> Result<(), anyhow::Error> {
        let expected = compute_hash(&self.name, self.total_ticks, &self.streams)?;
        if expected != self.hash {
            return Err(anyhow::anyhow!(
                "take hash mismatch: recorded {} but recomputed {}. \
                 The take may be corrupted or edited.",
                self.hash,
                expected
            ));
        }
        for stream in &self.streams {
            stream
                .validate()
                .map_err(|e| anyhow::anyhow!("take '{}' is inconsistent: {e}", self.name))?;
        }
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, anyhow::Error> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a take, dropping what cannot be used.
    ///
    /// Only a document that is not JSON at all, or that has no `streams`
    /// array, is an error. The returned take is resealed over what survived.
    pub fn from_json_lenient(json: &str) -> Result<(Take, LoadReport), anyhow::Error> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("take is not valid JSON: {e}"))?;
        let raw_streams = value
            .get("streams")
            .and_then(|s| s.as_array())
            .ok_or_else(|| anyhow::anyhow!("take has no `streams` array"))?;

        let name = value
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_owned();
        let stored_hash = value
            .get("hash")
            .and_then(|h| h.as_str())
            .unwrap_or_default()
            .to_owned();

        let mut report = LoadReport::default();
        let mut streams = Vec::with_capacity(raw_streams.len());
        for (index, raw) in raw_streams.iter().enumerate() {
            match ActionStream::from_value_lenient(raw) {
                Ok((stream, dropped)) => {
                    report.dropped_actions += dropped;
                    streams.push(stream);
                }
                Err(e) => {
                    tracing::warn!(index, error = %e, "dropping malformed stream");
                    report.dropped_streams += 1;
                }
            }
        }
        streams.sort_by_key(|s| s.logical_id);
        streams.dedup_by_key(|s| s.logical_id);

        let longest = streams.iter().map(ActionStream::end_tick).max().unwrap_or(0);
        let total_ticks = value
            .get("total_ticks")
            .and_then(|t| t.as_u64())
            .unwrap_or(longest)
            .max(longest);

        let mut take = Take {
            name,
            total_ticks,
            streams,
            hash: String::new(),
        };
        take.seal()?;
        report.hash_verified = !stored_hash.is_empty() && stored_hash == take.hash;
        if !report.hash_verified {
            tracing::warn!(
                name = %take.name,
                dropped_actions = report.dropped_actions,
                dropped_streams = report.dropped_streams,
                "take hash did not verify"
            );
        }
        Ok((take, report))
    }
}

impl SaveTarget for Take {
    fn store(&mut self, total_ticks: u64, mut streams: Vec<ActionStream>) {
        streams.sort_by_key(|s| s.logical_id);
        self.total_ticks = total_ticks;
        self.streams = streams;
        if let Err(e) = self.seal() {
            tracing::warn!(name = %self.name, error = %e, "failed to seal take");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cinereel_log::pose::Pose;
    use cinereel_log::state::ObjectSnapshot;

    fn sample_take() -> Take {
        let mut stream = ActionStream::new(LogicalId::MASTER, 0, ObjectSnapshot::default());
        for i in 0..10 {
            stream.push_pose(Pose::at(i as f64, 0.0, 0.0));
        }
        let mut take = Take::new("walk");
        take.store(10, vec![stream]);
        take
    }

    #[test]
    fn seal_then_verify() {
        let take = sample_take();
        assert_eq!(take.hash.len(), 64);
        take.verify().unwrap();
    }

    #[test]
    fn edits_break_verification() {
        let mut take = sample_take();
        take.total_ticks = 11;
        let err = take.verify().unwrap_err();
        assert!(err.to_string().contains("hash mismatch"));
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(sample_take().hash, sample_take().hash);
    }
}
