//! Per-client annotation session state.
//!
//! A `Session` is a plain value owned by whoever drives the annotation UI. The
//! [`crate::navigator::Navigator`] and [`crate::save::SaveOrchestrator`] take it by `&mut` on
//! every call; there is no hidden shared state.
//!
//! Invariants kept by the mutators in this module:
//! - `segments` is non-empty only when both a batch and a file are selected and the last load
//!   for exactly that pair succeeded.
//! - changing the batch clears the file selection and the segments.
//! - changing the file clears the segments.

use crate::catalog::{BatchId, FileId};
use crate::render::{MarkupRenderer, Preview};
use crate::segments::Segment;
use crate::{Error, Result};

/// The (batch, file) pair a segment list was loaded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileKey {
    pub batch: BatchId,
    pub file: FileId,
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    batch: Option<BatchId>,
    file: Option<FileId>,
    files: Vec<FileId>,
    segments: Vec<Segment>,
    loaded: Option<FileKey>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_batch(&self) -> Option<BatchId> {
        self.batch
    }

    pub fn current_file(&self) -> Option<FileId> {
        self.file
    }

    /// Files of the current batch, in catalog order.
    pub fn files(&self) -> &[FileId] {
        &self.files
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, id: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    /// The pair the current segments belong to, if a load succeeded.
    pub fn loaded_key(&self) -> Option<FileKey> {
        self.loaded
    }

    /// Select a file of the current batch. Selecting a different file drops loaded segments.
    pub fn select_file(&mut self, file: FileId) -> Result<()> {
        if self.batch.is_none() {
            return Err(Error::validation("Please select a batch first"));
        }
        if !self.files.contains(&file) {
            return Err(Error::not_found(format!("file {file} is not in the current batch")));
        }
        if self.file != Some(file) {
            self.file = Some(file);
            self.clear_segments();
        }
        Ok(())
    }

    /// Replace a loaded segment's draft markup.
    pub fn edit(&mut self, segment_id: &str, markup: impl Into<String>) -> Result<()> {
        let seg = self
            .segments
            .iter_mut()
            .find(|s| s.id == segment_id)
            .ok_or_else(|| Error::not_found(format!("segment '{segment_id}' is not loaded")))?;
        seg.markup = markup.into();
        Ok(())
    }

    /// Hand a segment's current markup to `renderer`. Session state is not touched.
    pub fn preview(&self, segment_id: &str, renderer: &impl MarkupRenderer) -> Result<Preview> {
        self.segment(segment_id)
            .map(|s| renderer.render(&s.markup))
            .ok_or_else(|| Error::not_found(format!("segment '{segment_id}' is not loaded")))
    }

    /// Index of the current file within `files`.
    pub fn position(&self) -> Option<usize> {
        let file = self.file?;
        self.files.iter().position(|&f| f == file)
    }

    pub fn has_prev(&self) -> bool {
        matches!(self.position(), Some(idx) if idx > 0)
    }

    pub fn has_next(&self) -> bool {
        matches!(self.position(), Some(idx) if idx + 1 < self.files.len())
    }

    pub(crate) fn reset_to_batch(&mut self, batch: Option<BatchId>) {
        self.batch = batch;
        self.file = None;
        self.files.clear();
        self.clear_segments();
    }

    pub(crate) fn set_files(&mut self, files: Vec<FileId>) {
        self.files = files;
    }

    pub(crate) fn set_segments(&mut self, key: FileKey, segments: Vec<Segment>) {
        self.segments = segments;
        self.loaded = Some(key);
    }

    pub(crate) fn clear_segments(&mut self) {
        self.segments.clear();
        self.loaded = None;
    }

    /// Record a successful save in the draft. Returns `false` if the segment is not loaded.
    pub(crate) fn write_through(&mut self, segment_id: &str, markup: &str) -> bool {
        match self.segments.iter_mut().find(|s| s.id == segment_id) {
            Some(seg) => {
                seg.markup = markup.to_owned();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn seg(id: &str, markup: &str) -> Segment {
        Segment {
            id: id.into(),
            verbatim: markup.into(),
            normalized: markup.into(),
            audio_reference: None,
            audio_path: None,
            markup: markup.into(),
        }
    }

    fn loaded_session() -> Session {
        let mut session = Session::new();
        session.reset_to_batch(Some(1));
        session.set_files(vec![4, 5, 6]);
        session.file = Some(5);
        session.set_segments(FileKey { batch: 1, file: 5 }, vec![seg("a", "x"), seg("b", "y")]);
        session
    }

    #[test]
    fn select_file_requires_batch_and_membership() {
        let mut session = Session::new();
        assert_eq!(session.select_file(1).unwrap_err().kind(), ErrorKind::Validation);

        let mut session = loaded_session();
        assert_eq!(session.select_file(9).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(session.current_file(), Some(5));
        assert_eq!(session.segments().len(), 2);
    }

    #[test]
    fn selecting_another_file_drops_segments() -> anyhow::Result<()> {
        let mut session = loaded_session();
        session.select_file(5)?;
        assert_eq!(session.segments().len(), 2);

        session.select_file(6)?;
        assert!(session.segments().is_empty());
        assert!(session.loaded_key().is_none());
        Ok(())
    }

    #[test]
    fn reset_to_batch_clears_everything_below_it() {
        let mut session = loaded_session();
        session.reset_to_batch(Some(2));
        assert_eq!(session.current_batch(), Some(2));
        assert_eq!(session.current_file(), None);
        assert!(session.files().is_empty());
        assert!(session.segments().is_empty());
    }

    #[test]
    fn reachability_follows_list_position() {
        let mut session = loaded_session();
        assert!(session.has_prev() && session.has_next());
        session.file = Some(4);
        assert!(!session.has_prev() && session.has_next());
        session.file = Some(6);
        assert!(session.has_prev() && !session.has_next());
        session.file = None;
        assert!(!session.has_prev() && !session.has_next());
    }

    #[test]
    fn edit_and_preview() -> anyhow::Result<()> {
        let mut session = loaded_session();
        session.edit("a", "<en>x</en>")?;
        assert_eq!(session.segment("a").map(|s| s.markup.as_str()), Some("<en>x</en>"));

        let upper = |m: &str| Preview::Ready(m.to_uppercase());
        assert_eq!(session.preview("a", &upper)?, Preview::Ready("<EN>X</EN>".into()));

        let not_ready = |_: &str| Preview::NotReady;
        assert_eq!(session.preview("b", &not_ready)?, Preview::NotReady);

        assert_eq!(session.edit("zz", "q").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            session.preview("zz", &upper).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        Ok(())
    }
}
