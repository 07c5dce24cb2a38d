//! Persisting segment markup, one at a time or in bulk.
//!
//! Bulk saves are split into three steps so a caller that releases the session while writes are
//! in flight still gets correct write-through:
//!
//! 1. [`SavePlan::from_session`] snapshots `(segment id, markup)` pairs and the file they
//!    belong to.
//! 2. [`SaveOrchestrator::execute`] writes them sequentially, never stopping early.
//! 3. [`SaveOutcome::apply_to`] copies the successful writes back into the session, unless the
//!    session has since moved to a different file, in which case they are discarded.
//!
//! [`SaveOrchestrator::save_all`] runs all three against a session it holds for the duration.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::opts::Opts;
use crate::session::{FileKey, Session};
use crate::upstream::bounded;
use crate::{Error, Result};

/// Aggregate result of a bulk save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAllReport {
    pub success_count: usize,
    pub fail_count: usize,
    pub failed_ids: BTreeSet<String>,
}

impl SaveAllReport {
    pub fn attempted(&self) -> usize {
        self.success_count + self.fail_count
    }

    pub fn is_complete(&self) -> bool {
        self.fail_count == 0
    }

    fn record(&mut self, segment_id: &str, res: &Result<()>) {
        match res {
            Ok(()) => self.success_count += 1,
            Err(_) => {
                self.fail_count += 1;
                self.failed_ids.insert(segment_id.to_owned());
            }
        }
    }
}

/// A snapshot of what a bulk save will write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePlan {
    pub key: Option<FileKey>,
    pub entries: Vec<(String, String)>,
}

impl SavePlan {
    /// Every loaded segment with its current draft markup, in session order.
    pub fn from_session(session: &Session) -> Self {
        Self {
            key: session.loaded_key(),
            entries: session
                .segments()
                .iter()
                .map(|s| (s.id.clone(), s.markup.clone()))
                .collect(),
        }
    }

    /// Only the listed segments, e.g. the failures of an earlier run.
    pub fn subset(session: &Session, ids: &BTreeSet<String>) -> Self {
        let mut plan = Self::from_session(session);
        plan.entries.retain(|(id, _)| ids.contains(id));
        plan
    }
}

/// What [`SaveOrchestrator::execute`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub key: Option<FileKey>,
    pub report: SaveAllReport,
    /// Successfully written `(segment id, markup)` pairs.
    pub saved: Vec<(String, String)>,
}

impl SaveOutcome {
    /// Write successful saves through to `session`.
    ///
    /// Returns `false` (and changes nothing) when the session no longer shows the file the plan
    /// was taken from.
    pub fn apply_to(&self, session: &mut Session) -> bool {
        if session.loaded_key() != self.key {
            warn!(
                saved = self.saved.len(),
                "session moved during bulk save; discarding write-through"
            );
            return false;
        }
        for (id, markup) in &self.saved {
            session.write_through(id, markup);
        }
        true
    }
}

/// Writes markup to the catalog and reconciles the session's drafts.
pub struct SaveOrchestrator<C: Catalog> {
    catalog: Arc<C>,
    upstream_timeout: Duration,
}

impl<C: Catalog> SaveOrchestrator<C> {
    pub fn new(catalog: Arc<C>, opts: &Opts) -> Self {
        Self {
            catalog,
            upstream_timeout: opts.upstream_timeout,
        }
    }

    /// Write one segment's markup to the catalog, with no session involved.
    ///
    /// Re-sending the same pair is safe and yields the same stored state.
    pub async fn persist(&self, segment_id: &str, markup: &str) -> Result<()> {
        if segment_id.trim().is_empty() {
            return Err(Error::validation("segment id is required"));
        }
        bounded(
            self.upstream_timeout,
            "catalog save",
            self.catalog.save_markup(segment_id, markup),
        )
        .await
    }

    /// Save one segment and, on success, update its draft in `session`.
    ///
    /// On failure the draft keeps whatever it held before, so nothing typed is lost.
    pub async fn save_one(&self, session: &mut Session, segment_id: &str, markup: &str) -> Result<()> {
        self.persist(segment_id, markup).await?;
        if !session.write_through(segment_id, markup) {
            debug!(segment_id, "saved segment is not loaded in this session");
        }
        Ok(())
    }

    /// Write every entry of `plan`, one after another, attempting each exactly once.
    pub async fn execute(&self, plan: &SavePlan) -> SaveOutcome {
        let mut report = SaveAllReport::default();
        let mut saved = Vec::with_capacity(plan.entries.len());

        for (id, markup) in &plan.entries {
            let res = self.persist(id, markup).await;
            if let Err(err) = &res {
                warn!(segment_id = %id, error = %err, "segment save failed");
            }
            report.record(id, &res);
            if res.is_ok() {
                saved.push((id.clone(), markup.clone()));
            }
        }

        SaveOutcome {
            key: plan.key,
            report,
            saved,
        }
    }

    /// Save every loaded segment's current draft and report per-segment failures.
    pub async fn save_all(&self, session: &mut Session) -> SaveAllReport {
        let plan = SavePlan::from_session(session);
        self.run(session, plan).await
    }

    /// Re-save only the segments listed in `report.failed_ids`.
    ///
    /// A listed segment that is no longer loaded in `session` cannot be re-sent; it stays in the
    /// returned report's `failed_ids`.
    pub async fn retry_failed(&self, session: &mut Session, report: &SaveAllReport) -> SaveAllReport {
        let plan = SavePlan::subset(session, &report.failed_ids);
        let unloaded: Vec<String> = report
            .failed_ids
            .iter()
            .filter(|id| !plan.entries.iter().any(|(planned, _)| planned == *id))
            .cloned()
            .collect();

        let mut retried = self.run(session, plan).await;
        for id in unloaded {
            warn!(segment_id = %id, "failed segment is no longer loaded; not retried");
            retried.record(&id, &Err(Error::not_found("segment is not loaded")));
        }
        retried
    }

    async fn run(&self, session: &mut Session, plan: SavePlan) -> SaveAllReport {
        let outcome = self.execute(&plan).await;
        outcome.apply_to(session);

        let report = outcome.report;
        info!(
            success = report.success_count,
            failed = report.fail_count,
            "bulk save finished"
        );
        report
    }
}
