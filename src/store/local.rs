//! Embedded LanceDB store.
//!
//! Every generation is its own LanceDB table (`docqa-<generation>`) inside the store directory.
//! A `CURRENT` file names the published table and is replaced through a temp-file rename, so a
//! crash mid-rebuild leaves the previous generation published. Filtered searches push a
//! `source = '<id>'` predicate down to LanceDB.
//!
//! Older tables are dropped after each publish, except the previous generation and any
//! generation a reader still holds.

use super::{EmbeddedChunk, ScoredChunk, StoreError, VectorSnapshot, VectorStore, new_generation_id};
use arrow_array::{
    FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt64Array, types::Float32Type,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::{
    Connection, DistanceType, Table, connect,
    query::{ExecutableQuery, QueryBase},
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::OnceCell;

const CURRENT_FILE: &str = "CURRENT";
const TABLE_PREFIX: &str = "docqa-";
const DISTANCE_COLUMN: &str = "_distance";

fn chunk_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("text", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt64, false),
        Field::new("chunk_index", DataType::UInt64, false),
        Field::new("chunk_hash", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension),
            true,
        ),
    ]))
}

fn to_record_batch(chunks: &[EmbeddedChunk], dimension: i32) -> Result<RecordBatch, StoreError> {
    let texts = StringArray::from_iter_values(chunks.iter().map(|chunk| chunk.text.as_str()));
    let sources = StringArray::from_iter_values(chunks.iter().map(|chunk| chunk.source.as_str()));
    let pages = UInt64Array::from_iter_values(chunks.iter().map(|chunk| chunk.page as u64));
    let indexes = UInt64Array::from_iter_values(chunks.iter().map(|chunk| chunk.index as u64));
    let hashes =
        StringArray::from_iter_values(chunks.iter().map(|chunk| chunk.chunk_hash.as_str()));
    let vectors = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        chunks
            .iter()
            .map(|chunk| Some(chunk.vector.iter().copied().map(Some).collect::<Vec<_>>())),
        dimension,
    );

    Ok(RecordBatch::try_new(
        chunk_schema(dimension),
        vec![
            Arc::new(texts),
            Arc::new(sources),
            Arc::new(pages),
            Arc::new(indexes),
            Arc::new(hashes),
            Arc::new(vectors),
        ],
    )?)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|array| array.as_any().downcast_ref::<T>())
        .ok_or_else(|| StoreError::MalformedTable(format!("missing or mistyped column `{name}`")))
}

fn scored_chunks(batch: &RecordBatch) -> Result<Vec<ScoredChunk>, StoreError> {
    let texts = column::<StringArray>(batch, "text")?;
    let sources = column::<StringArray>(batch, "source")?;
    let pages = column::<UInt64Array>(batch, "page")?;
    let distances = column::<Float32Array>(batch, DISTANCE_COLUMN)?;

    Ok((0..batch.num_rows())
        .map(|row| ScoredChunk {
            text: texts.value(row).to_string(),
            source: sources.value(row).to_string(),
            page: pages.value(row) as usize,
            score: 1.0 - distances.value(row),
        })
        .collect())
}

fn source_predicate(source: &str) -> String {
    format!("source = '{}'", source.replace('\'', "''"))
}

/// One published generation, backed by a LanceDB table.
pub struct LocalSnapshot {
    table: Table,
    dimension: usize,
    len: usize,
}

#[async_trait]
impl VectorSnapshot for LocalSnapshot {
    fn id(&self) -> &str {
        self.table.name()
    }

    fn len(&self) -> usize {
        self.len
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        limit: usize,
        source: Option<&str>,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if limit == 0 || self.len == 0 {
            return Ok(Vec::new());
        }

        let mut query = self
            .table
            .vector_search(vector.to_vec())?
            .distance_type(DistanceType::Cosine)
            .limit(limit);
        if let Some(source) = source {
            query = query.only_if(source_predicate(source));
        }

        let mut stream = query.execute().await?;
        let mut hits = Vec::new();
        while let Some(batch) = futures::TryStreamExt::try_next(&mut stream).await? {
            hits.extend(scored_chunks(&batch)?);
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Vector store keeping one LanceDB table per generation under a local directory.
pub struct LocalVectorStore {
    root: PathBuf,
    db: OnceCell<Connection>,
    live: Mutex<Vec<Weak<LocalSnapshot>>>,
}

impl LocalVectorStore {
    /// Store rooted at `root`; nothing is created on disk until the first publish.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            db: OnceCell::new(),
            live: Mutex::new(Vec::new()),
        }
    }

    async fn connection(&self) -> Result<&Connection, StoreError> {
        self.db
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.root).await?;
                let uri = self.root.to_string_lossy().into_owned();
                tracing::debug!(uri = %uri, "Connecting to LanceDB");
                Ok::<_, StoreError>(connect(&uri).execute().await?)
            })
            .await
    }

    async fn read_current(&self) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.root.join(CURRENT_FILE)).await {
            Ok(contents) => {
                let name = contents.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    async fn publish(&self, table: &str) -> Result<(), StoreError> {
        let staged = self.root.join(format!("{CURRENT_FILE}.tmp"));
        tokio::fs::write(&staged, table).await?;
        tokio::fs::rename(&staged, self.root.join(CURRENT_FILE)).await?;
        Ok(())
    }

    async fn open_snapshot(&self, table: Table) -> Result<Arc<LocalSnapshot>, StoreError> {
        let schema = table.schema().await?;
        let dimension = match schema.field_with_name("vector")?.data_type() {
            DataType::FixedSizeList(_, size) => *size as usize,
            other => {
                return Err(StoreError::MalformedTable(format!(
                    "vector column has type {other}"
                )));
            }
        };
        let len = table.count_rows(None).await?;

        let snapshot = Arc::new(LocalSnapshot {
            table,
            dimension,
            len,
        });
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(&snapshot));
        Ok(snapshot)
    }

    /// Tables some caller still holds a snapshot of.
    fn tables_in_use(&self) -> Vec<String> {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.retain(|weak| weak.strong_count() > 0);
        live.iter()
            .filter_map(Weak::upgrade)
            .map(|snapshot| snapshot.table.name().to_string())
            .collect()
    }

    /// Delete every generation except `current`, `previous` and tables still being read.
    async fn prune(&self, db: &Connection, current: &str, previous: Option<&str>) {
        let names = match db.table_names().execute().await {
            Ok(names) => names,
            Err(error) => {
                tracing::warn!(error = %error, "Skipping prune");
                return;
            }
        };
        let in_use = self.tables_in_use();

        for name in names {
            if !name.starts_with(TABLE_PREFIX)
                || name == current
                || Some(name.as_str()) == previous
                || in_use.contains(&name)
            {
                continue;
            }
            // Local tables are `<name>.lance` directories under the store root.
            let path = self.root.join(format!("{name}.lance"));
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => tracing::debug!(table = %name, "Dropped stale generation"),
                Err(error) => {
                    tracing::warn!(table = %name, error = %error, "Failed to drop stale generation")
                }
            }
        }
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn replace_all(
        &self,
        chunks: Vec<EmbeddedChunk>,
    ) -> Result<Arc<dyn VectorSnapshot>, StoreError> {
        let Some(first) = chunks.first() else {
            return Err(StoreError::EmptyGeneration);
        };
        let dimension = first.vector.len();
        if let Some(bad) = chunks.iter().find(|chunk| chunk.vector.len() != dimension) {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }
        let width = i32::try_from(dimension).map_err(|_| {
            StoreError::MalformedTable(format!("dimension {dimension} is too large"))
        })?;

        let batch = to_record_batch(&chunks, width)?;
        let schema = batch.schema();
        let db = self.connection().await?;
        let name = format!("{TABLE_PREFIX}{}", new_generation_id());
        let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
        let table = db.create_table(&name, Box::new(reader)).execute().await?;
        let snapshot = self.open_snapshot(table).await?;

        let previous = self.read_current().await?;
        self.publish(&name).await?;
        tracing::info!(
            dir = %self.root.display(),
            table = %name,
            chunks = snapshot.len,
            "Published local generation"
        );
        self.prune(db, &name, previous.as_deref()).await;

        Ok(snapshot as Arc<dyn VectorSnapshot>)
    }

    async fn open_current(&self) -> Result<Option<Arc<dyn VectorSnapshot>>, StoreError> {
        let Some(name) = self.read_current().await? else {
            return Ok(None);
        };
        let db = self.connection().await?;
        let table = db.open_table(&name).execute().await?;
        let snapshot = self.open_snapshot(table).await?;
        tracing::info!(
            dir = %self.root.display(),
            table = %name,
            chunks = snapshot.len,
            "Reopened local generation"
        );
        Ok(Some(snapshot as Arc<dyn VectorSnapshot>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(text: &str, source: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            text: text.into(),
            source: source.into(),
            page: 0,
            index: 0,
            chunk_hash: crate::qdrant::compute_chunk_hash(text),
            vector,
        }
    }

    fn sample() -> Vec<EmbeddedChunk> {
        vec![
            chunk("Paris", "notes.txt", vec![1.0, 0.0]),
            chunk("Berlin", "other.txt", vec![0.9, 0.1]),
            chunk("Tokyo", "notes.txt", vec![0.0, 1.0]),
        ]
    }

    fn table_dirs(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .expect("store dir")
            .filter_map(|entry| {
                let name = entry.expect("entry").file_name().to_string_lossy().into_owned();
                name.strip_suffix(".lance").map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    #[test]
    fn source_predicate_escapes_quotes() {
        assert_eq!(source_predicate("notes.txt"), "source = 'notes.txt'");
        assert_eq!(source_predicate("o'brien.pdf"), "source = 'o''brien.pdf'");
    }

    #[tokio::test]
    async fn search_orders_by_similarity_and_honors_limit() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalVectorStore::new(dir.path().to_path_buf());
        let snapshot = store.replace_all(sample()).await.expect("published");

        let hits = snapshot
            .similarity_search(&[1.0, 0.0], 2, None)
            .await
            .expect("search");
        let texts: Vec<_> = hits.iter().map(|hit| hit.text.as_str()).collect();
        assert_eq!(texts, vec!["Paris", "Berlin"]);
        assert!((hits[0].score - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn search_filters_by_source() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalVectorStore::new(dir.path().to_path_buf());
        let snapshot = store.replace_all(sample()).await.expect("published");

        let hits = snapshot
            .similarity_search(&[1.0, 0.0], 8, Some("notes.txt"))
            .await
            .expect("search");
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.source == "notes.txt"));

        let none = snapshot
            .similarity_search(&[1.0, 0.0], 8, Some("other.pdf"))
            .await
            .expect("search");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn query_dimension_must_match_table() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalVectorStore::new(dir.path().to_path_buf());
        let snapshot = store.replace_all(sample()).await.expect("published");

        let error = snapshot
            .similarity_search(&[1.0, 0.0, 0.0], 4, None)
            .await
            .err()
            .expect("error");
        assert!(matches!(error, StoreError::DimensionMismatch { expected: 2, actual: 3 }));
    }

    #[tokio::test]
    async fn published_generation_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let snapshot = LocalVectorStore::new(dir.path().to_path_buf())
            .replace_all(sample())
            .await
            .expect("published");

        let reopened = LocalVectorStore::new(dir.path().to_path_buf())
            .open_current()
            .await
            .expect("reopen")
            .expect("snapshot");
        assert_eq!(reopened.id(), snapshot.id());
        assert!(reopened.id().starts_with(TABLE_PREFIX));
        assert_eq!(reopened.len(), 3);
        let hits = reopened
            .similarity_search(&[0.0, 1.0], 1, None)
            .await
            .expect("search");
        assert_eq!(hits[0].text, "Tokyo");
    }

    #[tokio::test]
    async fn empty_store_has_no_current_generation() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalVectorStore::new(dir.path().join("missing"));
        assert!(store.open_current().await.expect("lookup").is_none());
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn only_current_and_previous_generations_are_kept() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalVectorStore::new(dir.path().to_path_buf());
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(store.replace_all(sample()).await.expect("published").id().to_string());
        }

        assert_eq!(table_dirs(&dir), vec![ids[1].clone(), ids[2].clone()]);
    }

    #[tokio::test]
    async fn held_generations_are_not_dropped() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalVectorStore::new(dir.path().to_path_buf());
        let held = store.replace_all(sample()).await.expect("published");
        for _ in 0..2 {
            store.replace_all(sample()).await.expect("published");
        }

        assert_eq!(table_dirs(&dir).len(), 3);
        let hits = held
            .similarity_search(&[1.0, 0.0], 8, Some("notes.txt"))
            .await
            .expect("search");
        assert_eq!(hits.len(), 2);

        let held_id = held.id().to_string();
        drop(held);
        store.replace_all(sample()).await.expect("published");
        assert!(!table_dirs(&dir).contains(&held_id));
    }

    #[tokio::test]
    async fn mixed_dimensions_are_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalVectorStore::new(dir.path().to_path_buf());
        let chunks = vec![
            chunk("a", "a.txt", vec![1.0, 0.0]),
            chunk("b", "a.txt", vec![1.0]),
        ];
        let error = store.replace_all(chunks).await.err().expect("error");
        assert!(matches!(error, StoreError::DimensionMismatch { expected: 2, actual: 1 }));
        assert!(store.open_current().await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn empty_generation_is_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let store = LocalVectorStore::new(dir.path().to_path_buf());
        let error = store.replace_all(Vec::new()).await.err().expect("error");
        assert!(matches!(error, StoreError::EmptyGeneration));
    }
}
