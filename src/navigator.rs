//! Batch → file → segments navigation over a [`Catalog`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::catalog::{BatchId, Catalog, FileId};
use crate::opts::Opts;
use crate::segments::Segment;
use crate::session::{FileKey, Session};
use crate::upstream::bounded;
use crate::{Error, Result};

/// Outcome of a prev/next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Moved to this file and loaded its segments.
    Moved(FileId),
    /// Already at the boundary (or nothing selected); the session is unchanged.
    NoOp,
}

/// Keeps a [`Session`]'s selection consistent with the catalog.
///
/// The stateless helpers (`max_batch`, `files`, `segments`) are what the HTTP API serves; the
/// session-taking methods layer selection state on top of them.
pub struct Navigator<C: Catalog> {
    catalog: Arc<C>,
    audio_base_path: String,
    upstream_timeout: Duration,
}

impl<C: Catalog> Navigator<C> {
    pub fn new(catalog: Arc<C>, opts: &Opts) -> Self {
        Self {
            catalog,
            audio_base_path: opts.audio_base_path.clone(),
            upstream_timeout: opts.upstream_timeout,
        }
    }

    pub fn catalog(&self) -> &Arc<C> {
        &self.catalog
    }

    pub async fn max_batch(&self) -> Result<BatchId> {
        bounded(self.upstream_timeout, "catalog batches", self.catalog.max_batch()).await
    }

    pub async fn files(&self, batch: BatchId) -> Result<Vec<FileId>> {
        bounded(
            self.upstream_timeout,
            "catalog files",
            self.catalog.list_files(batch),
        )
        .await
    }

    /// Segments of one file with markup defaulted and audio paths resolved.
    pub async fn segments(&self, batch: BatchId, file: FileId) -> Result<Vec<Segment>> {
        let records = bounded(
            self.upstream_timeout,
            "catalog segments",
            self.catalog.load_segments(batch, file),
        )
        .await?;

        Ok(records
            .into_iter()
            .map(|r| Segment::from_record(r, &self.audio_base_path))
            .collect())
    }

    /// Switch the session to `batch` and fetch its file list.
    ///
    /// The file selection and segments are always cleared, even if the fetch fails; on failure
    /// the session is left with no batch selected.
    pub async fn select_batch(&self, session: &mut Session, batch: BatchId) -> Result<Vec<FileId>> {
        session.reset_to_batch(Some(batch));

        match self.files(batch).await {
            Ok(files) => {
                debug!(batch, files = files.len(), "selected batch");
                session.set_files(files.clone());
                Ok(files)
            }
            Err(err) => {
                session.reset_to_batch(None);
                Err(err)
            }
        }
    }

    /// Load segments for the session's current (batch, file).
    ///
    /// On failure the previous segments are dropped so they can never be mistaken for the
    /// current file's.
    pub async fn load_segments<'s>(&self, session: &'s mut Session) -> Result<&'s [Segment]> {
        let (Some(batch), Some(file)) = (session.current_batch(), session.current_file()) else {
            return Err(Error::validation("Please select both batch and file"));
        };

        match self.segments(batch, file).await {
            Ok(segments) => {
                info!(batch, file, segments = segments.len(), "loaded segments");
                session.set_segments(FileKey { batch, file }, segments);
                Ok(session.segments())
            }
            Err(err) => {
                session.clear_segments();
                Err(err)
            }
        }
    }

    /// Select `batch` (if not already current) and `file`, then load.
    pub async fn open<'s>(
        &self,
        session: &'s mut Session,
        batch: BatchId,
        file: FileId,
    ) -> Result<&'s [Segment]> {
        if session.current_batch() != Some(batch) || session.files().is_empty() {
            self.select_batch(session, batch).await?;
        }
        session.select_file(file)?;
        self.load_segments(session).await
    }

    pub async fn prev(&self, session: &mut Session) -> Result<Step> {
        match session.position() {
            Some(idx) if idx > 0 => {
                let target = session.files()[idx - 1];
                self.step_to(session, target).await
            }
            _ => Ok(Step::NoOp),
        }
    }

    pub async fn next(&self, session: &mut Session) -> Result<Step> {
        match session.position() {
            Some(idx) if idx + 1 < session.files().len() => {
                let target = session.files()[idx + 1];
                self.step_to(session, target).await
            }
            _ => Ok(Step::NoOp),
        }
    }

    async fn step_to(&self, session: &mut Session, file: FileId) -> Result<Step> {
        session.select_file(file)?;
        self.load_segments(session).await?;
        Ok(Step::Moved(file))
    }
}
