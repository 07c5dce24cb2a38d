use serde::{Deserialize, Serialize};

use crate::catalog::SegmentRecord;

/// A segment as held in a [`crate::session::Session`]: the working draft of one utterance.
///
/// `verbatim` and `normalized` are read-only source transcripts. `markup` is the editable
/// annotation; it starts as the stored markup, or the verbatim text when nothing was saved yet.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: String,
    pub verbatim: String,
    pub normalized: String,
    /// Stored relative reference, kept so the segment can be re-expressed as a record.
    #[serde(default)]
    pub audio_reference: Option<String>,
    /// Playable location: the audio base path joined with `audio_reference`.
    #[serde(default)]
    pub audio_path: Option<String>,
    pub markup: String,
}

impl Segment {
    pub fn from_record(record: SegmentRecord, audio_base_path: &str) -> Self {
        let audio_path = record
            .audio_reference
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(|r| resolve_audio_path(audio_base_path, r));
        let markup = record.markup.unwrap_or_else(|| record.verbatim.clone());

        Self {
            id: record.id,
            verbatim: record.verbatim,
            normalized: record.normalized,
            audio_reference: record.audio_reference,
            audio_path,
            markup,
        }
    }

    /// The catalog view of this draft, with the current markup as the stored value.
    pub fn to_record(&self) -> SegmentRecord {
        SegmentRecord {
            id: self.id.clone(),
            verbatim: self.verbatim.clone(),
            normalized: self.normalized.clone(),
            audio_reference: self.audio_reference.clone(),
            markup: Some(self.markup.clone()),
        }
    }
}

/// Join a base path and a stored reference with exactly one `/` between them.
fn resolve_audio_path(base: &str, reference: &str) -> String {
    let base = base.trim_end_matches('/');
    let reference = reference.trim_start_matches('/');
    format!("{base}/{reference}")
}
