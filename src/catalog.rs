//! The annotation catalog: batches → files → segment records.
//!
//! The catalog owns the durable copy of every segment. The core reads records from it and writes
//! markup back to it; nothing else.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{Error, Result};

/// Batches are numbered from 1.
pub type BatchId = u32;

/// Files are numbered within a batch.
pub type FileId = u32;

/// A segment as stored in the catalog.
///
/// Field aliases accept the legacy document names (`unsanitized_verbatim`, `audio_filepath`,
/// `rsml`, ...) so existing exports load without conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub id: String,
    #[serde(default, alias = "unsanitized_verbatim")]
    pub verbatim: String,
    #[serde(default, alias = "unsanitized_normalized")]
    pub normalized: String,
    #[serde(default, alias = "audio_filepath")]
    pub audio_reference: Option<String>,
    #[serde(default, alias = "rsml")]
    pub markup: Option<String>,
}

/// Read/write access to annotation data.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Highest batch number available (batches run `1..=max_batch`).
    async fn max_batch(&self) -> Result<BatchId>;

    /// Files in `batch`, in catalog order. Fails with [`Error::NotFound`] for an unknown batch.
    async fn list_files(&self, batch: BatchId) -> Result<Vec<FileId>>;

    /// Segments of one file, in catalog order.
    async fn load_segments(&self, batch: BatchId, file: FileId) -> Result<Vec<SegmentRecord>>;

    /// Overwrite a segment's stored markup. Writing the same value twice is harmless.
    async fn save_markup(&self, segment_id: &str, markup: &str) -> Result<()>;
}

/// On-disk seed format: `{ "batches": { "1": { "1": [ {segment}, ... ] } } }`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub batches: BTreeMap<BatchId, BTreeMap<FileId, Vec<SegmentRecord>>>,
}

#[derive(Debug, Default)]
struct CatalogData {
    batches: BTreeMap<BatchId, BTreeMap<FileId, Vec<SegmentRecord>>>,
    // segment id → (batch, file, position)
    index: HashMap<String, (BatchId, FileId, usize)>,
}

/// A process-local [`Catalog`].
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    data: RwLock<CatalogData>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a seed document. Duplicate segment ids are rejected.
    pub fn from_document(doc: CatalogDocument) -> Result<Self> {
        let mut index = HashMap::new();
        for (&batch, files) in &doc.batches {
            for (&file, segments) in files {
                for (pos, seg) in segments.iter().enumerate() {
                    if index.insert(seg.id.clone(), (batch, file, pos)).is_some() {
                        return Err(Error::validation(format!(
                            "duplicate segment id '{}' in catalog",
                            seg.id
                        )));
                    }
                }
            }
        }

        Ok(Self {
            data: RwLock::new(CatalogData {
                batches: doc.batches,
                index,
            }),
        })
    }

    /// Parse a JSON seed document from `r`.
    pub fn from_json_reader<R: Read>(r: R) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_reader(r)
            .map_err(|err| Error::validation(format!("invalid catalog document: {err}")))?;
        Self::from_document(doc)
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn max_batch(&self) -> Result<BatchId> {
        let data = self.data.read().await;
        Ok(data.batches.keys().next_back().copied().unwrap_or(0))
    }

    async fn list_files(&self, batch: BatchId) -> Result<Vec<FileId>> {
        let data = self.data.read().await;
        data.batches
            .get(&batch)
            .map(|files| files.keys().copied().collect())
            .ok_or_else(|| Error::not_found(format!("batch {batch} not found")))
    }

    async fn load_segments(&self, batch: BatchId, file: FileId) -> Result<Vec<SegmentRecord>> {
        let data = self.data.read().await;
        data.batches
            .get(&batch)
            .and_then(|files| files.get(&file))
            .cloned()
            .ok_or_else(|| Error::not_found(format!("file {file} not found in batch {batch}")))
    }

    async fn save_markup(&self, segment_id: &str, markup: &str) -> Result<()> {
        let mut data = self.data.write().await;
        let &(batch, file, pos) = data
            .index
            .get(segment_id)
            .ok_or_else(|| Error::not_found(format!("segment '{segment_id}' not found")))?;

        let record = data
            .batches
            .get_mut(&batch)
            .and_then(|files| files.get_mut(&file))
            .and_then(|segments| segments.get_mut(pos))
            .ok_or_else(|| Error::upstream("catalog index out of sync"))?;
        record.markup = Some(markup.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    const SEED: &str = r#"{
        "batches": {
            "1": {
                "3": [{"id": "s3", "unsanitized_verbatim": "three", "unsanitized_normalized": "3"}],
                "1": [
                    {"id": "s1", "verbatim": "one", "normalized": "1", "audio_filepath": "b1/f1/s1.wav"},
                    {"id": "s2", "verbatim": "two", "normalized": "2", "rsml": "<noise> two"}
                ]
            },
            "2": {}
        }
    }"#;

    #[tokio::test]
    async fn loads_seed_with_legacy_field_names() -> anyhow::Result<()> {
        let catalog = MemoryCatalog::from_json_reader(SEED.as_bytes())?;
        assert_eq!(catalog.max_batch().await?, 2);
        assert_eq!(catalog.list_files(1).await?, vec![1, 3]);
        assert!(catalog.list_files(2).await?.is_empty());

        let segs = catalog.load_segments(1, 1).await?;
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].audio_reference.as_deref(), Some("b1/f1/s1.wav"));
        assert_eq!(segs[1].markup.as_deref(), Some("<noise> two"));

        let segs = catalog.load_segments(1, 3).await?;
        assert_eq!(segs[0].verbatim, "three");
        assert!(segs[0].markup.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_batch_file_and_segment_are_not_found() -> anyhow::Result<()> {
        let catalog = MemoryCatalog::from_json_reader(SEED.as_bytes())?;
        assert_eq!(catalog.list_files(9).await.unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            catalog.load_segments(1, 2).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            catalog.save_markup("nope", "x").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        Ok(())
    }

    #[tokio::test]
    async fn save_markup_is_idempotent() -> anyhow::Result<()> {
        let catalog = MemoryCatalog::from_json_reader(SEED.as_bytes())?;
        catalog.save_markup("s1", "<en>one</en>").await?;
        catalog.save_markup("s1", "<en>one</en>").await?;
        let segs = catalog.load_segments(1, 1).await?;
        assert_eq!(segs[0].markup.as_deref(), Some("<en>one</en>"));
        assert_eq!(segs[1].markup.as_deref(), Some("<noise> two"));
        Ok(())
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let seed = r#"{"batches": {"1": {"1": [{"id": "x"}], "2": [{"id": "x"}]}}}"#;
        let err = MemoryCatalog::from_json_reader(seed.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn empty_catalog_has_no_batches() -> anyhow::Result<()> {
        assert_eq!(MemoryCatalog::new().max_batch().await?, 0);
        Ok(())
    }
}
