use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rsml_annotator::catalog::{BatchId, Catalog, FileId, MemoryCatalog, SegmentRecord};
use rsml_annotator::navigator::{Navigator, Step};
use rsml_annotator::render::Preview;
use rsml_annotator::save::{SaveOrchestrator, SavePlan};
use rsml_annotator::{Error, ErrorKind, Opts, Result, Session};

const CATALOG: &str = r#"{
    "batches": {
        "4": {
            "1": [
                {"id": "4-1-a", "verbatim": "one"},
                {"id": "4-1-b", "verbatim": "two"},
                {"id": "4-1-c", "verbatim": "three"}
            ],
            "2": [{"id": "4-2-a", "verbatim": "four"}]
        }
    }
}"#;

/// Delegates to a memory catalog but refuses saves for ids in `failing`.
struct Flaky {
    inner: MemoryCatalog,
    failing: Mutex<BTreeSet<String>>,
}

impl Flaky {
    fn new(failing: &[&str]) -> anyhow::Result<Self> {
        Ok(Self {
            inner: MemoryCatalog::from_json_reader(CATALOG.as_bytes())?,
            failing: Mutex::new(failing.iter().map(|s| s.to_string()).collect()),
        })
    }

    fn heal(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    fn is_failing(&self, id: &str) -> bool {
        self.failing.lock().map(|f| f.contains(id)).unwrap_or(true)
    }
}

#[async_trait]
impl Catalog for Flaky {
    async fn max_batch(&self) -> Result<BatchId> {
        self.inner.max_batch().await
    }

    async fn list_files(&self, batch: BatchId) -> Result<Vec<FileId>> {
        self.inner.list_files(batch).await
    }

    async fn load_segments(&self, batch: BatchId, file: FileId) -> Result<Vec<SegmentRecord>> {
        self.inner.load_segments(batch, file).await
    }

    async fn save_markup(&self, segment_id: &str, markup: &str) -> Result<()> {
        if self.is_failing(segment_id) {
            return Err(Error::upstream("catalog unavailable"));
        }
        self.inner.save_markup(segment_id, markup).await
    }
}

fn parts(failing: &[&str]) -> anyhow::Result<(Arc<Flaky>, Navigator<Flaky>, SaveOrchestrator<Flaky>)> {
    let catalog = Arc::new(Flaky::new(failing)?);
    let opts = Opts::default();
    Ok((
        catalog.clone(),
        Navigator::new(catalog.clone(), &opts),
        SaveOrchestrator::new(catalog, &opts),
    ))
}

async fn stored_markup(catalog: &Flaky, file: FileId, id: &str) -> anyhow::Result<Option<String>> {
    let records = catalog.load_segments(4, file).await?;
    Ok(records.into_iter().find(|r| r.id == id).and_then(|r| r.markup))
}

#[tokio::test]
async fn partial_bulk_save_reports_failures_and_retry_completes() -> anyhow::Result<()> {
    let (catalog, nav, saver) = parts(&["4-1-b"])?;
    let mut session = Session::new();
    nav.open(&mut session, 4, 1).await?;

    session.edit("4-1-a", "<x>one</x>")?;
    session.edit("4-1-b", "<x>two</x>")?;

    let report = saver.save_all(&mut session).await;
    assert_eq!(report.attempted(), 3);
    assert_eq!(report.success_count, 2);
    assert_eq!(report.fail_count, 1);
    assert_eq!(
        report.failed_ids.iter().map(String::as_str).collect::<Vec<_>>(),
        vec!["4-1-b"]
    );

    // Untouched segments are saved with their verbatim default.
    assert_eq!(stored_markup(&catalog, 1, "4-1-c").await?.as_deref(), Some("three"));
    assert_eq!(stored_markup(&catalog, 1, "4-1-b").await?, None);
    // The failed draft is still there to retry.
    assert_eq!(session.segment("4-1-b").map(|s| s.markup.as_str()), Some("<x>two</x>"));

    catalog.heal();
    let retry = saver.retry_failed(&mut session, &report).await;
    assert_eq!(retry.attempted(), 1);
    assert!(retry.is_complete());
    assert_eq!(stored_markup(&catalog, 1, "4-1-b").await?.as_deref(), Some("<x>two</x>"));
    Ok(())
}

#[tokio::test]
async fn write_through_is_dropped_after_navigating_away() -> anyhow::Result<()> {
    let (catalog, nav, saver) = parts(&[])?;
    let mut session = Session::new();
    nav.open(&mut session, 4, 1).await?;
    session.edit("4-1-a", "<late/>")?;

    let plan = SavePlan::from_session(&session);
    assert_eq!(nav.next(&mut session).await?, Step::Moved(2));

    let outcome = saver.execute(&plan).await;
    assert!(outcome.report.is_complete());
    assert!(!outcome.apply_to(&mut session));

    assert_eq!(session.current_file(), Some(2));
    assert!(session.segment("4-1-a").is_none());
    assert_eq!(stored_markup(&catalog, 1, "4-1-a").await?.as_deref(), Some("<late/>"));
    Ok(())
}

#[tokio::test]
async fn save_one_failure_keeps_draft() -> anyhow::Result<()> {
    let (_catalog, nav, saver) = parts(&["4-2-a"])?;
    let mut session = Session::new();
    nav.open(&mut session, 4, 2).await?;
    session.edit("4-2-a", "<draft/>")?;

    let err = saver
        .save_one(&mut session, "4-2-a", "<draft/>")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Upstream);
    assert_eq!(session.segment("4-2-a").map(|s| s.markup.as_str()), Some("<draft/>"));
    Ok(())
}

#[tokio::test]
async fn preview_uses_current_draft() -> anyhow::Result<()> {
    let (_catalog, nav, _saver) = parts(&[])?;
    let mut session = Session::new();
    nav.open(&mut session, 4, 2).await?;
    session.edit("4-2-a", "<b>four</b>")?;

    let renderer = |markup: &str| {
        if markup.contains('<') {
            Preview::Ready(format!("rendered:{markup}"))
        } else {
            Preview::NotReady
        }
    };
    assert_eq!(
        session.preview("4-2-a", &renderer)?,
        Preview::Ready("rendered:<b>four</b>".to_owned())
    );
    assert_eq!(
        session.preview("missing", &renderer).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    Ok(())
}
