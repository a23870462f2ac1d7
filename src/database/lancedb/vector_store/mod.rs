
use super::{IndexedEntry, RetrievedChunk};
use crate::embeddings::{Chunk, Embedder};
use crate::{Result, ToolsyError};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const TABLE_NAME: &str = "tool_chunks";

/// Present in the index directory while a build is running
pub const BUILD_LOCK_FILE: &str = ".build.lock";

/// Nearest-neighbour index over tool chunks, backed by a LanceDB table
pub struct VectorIndex {
    table: Table,
    embedder: Arc<dyn Embedder>,
    dimension: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("table", &self.table.name())
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl VectorIndex {
    /// Embed every chunk once and store it, replacing any previous index at `path`
    ///
    /// # Arguments
    /// * `path` - Index directory
    /// * `chunks` - Chunks in catalog order; their order becomes the insertion position
    /// * `embedder` - Model used for both the stored vectors and later queries
    #[inline]
    pub async fn build(
        path: &Path,
        chunks: &[Chunk],
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(ToolsyError::Storage(
                "Cannot build an index without chunks".to_string(),
            ));
        }

        fs::create_dir_all(path).map_err(|e| {
            ToolsyError::Storage(format!("Failed to create vector database directory: {}", e))
        })?;
        let _lock = BuildLock::acquire(path)?;

        info!("Embedding {} chunks", chunks.len());
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = embed_blocking(Arc::clone(&embedder), texts).await?;
        let entries = index_entries(chunks, vectors)?;
        let dimension = entries.first().map_or(0, IndexedEntry::dimension);

        let connection = connect(path).await?;
        drop_table_if_exists(&connection).await?;

        let schema = create_schema(dimension);
        let table = connection
            .create_empty_table(TABLE_NAME, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| ToolsyError::Storage(format!("Failed to create table: {}", e)))?;

        let record_batch = create_record_batch(&entries, schema)?;
        let batch_schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), batch_schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| ToolsyError::Storage(format!("Failed to insert chunks: {}", e)))?;

        info!(
            "Built index of {} chunks ({} dimensions) at {:?}",
            entries.len(),
            dimension,
            path
        );

        Ok(Self {
            table,
            embedder,
            dimension,
        })
    }

    /// Open a previously built index without rebuilding it
    #[inline]
    pub async fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        if path.join(BUILD_LOCK_FILE).exists() {
            return Err(ToolsyError::Storage(format!(
                "An index build is in progress at {:?}",
                path
            )));
        }
        if !path.exists() {
            return Err(ToolsyError::Storage(format!(
                "No vector index found at {:?}; run build-index first",
                path
            )));
        }

        let connection = connect(path).await?;
        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| ToolsyError::Storage(format!("Failed to list tables: {}", e)))?;
        if !table_names.iter().any(|name| name == TABLE_NAME) {
            return Err(ToolsyError::Storage(format!(
                "No vector index found at {:?}; run build-index first",
                path
            )));
        }

        let table = connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| ToolsyError::Storage(format!("Failed to open table: {}", e)))?;
        let dimension = detect_vector_dimension(&table).await?;

        debug!("Opened vector index at {:?} ({} dimensions)", path, dimension);
        Ok(Self {
            table,
            embedder,
            dimension,
        })
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored chunks
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| ToolsyError::Storage(format!("Failed to count rows: {}", e)))
    }

    /// The `k` chunks nearest to `text`, nearest first, ties in insertion order
    #[inline]
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let total = self.count().await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut vectors = embed_blocking(Arc::clone(&self.embedder), vec![text.to_string()]).await?;
        let query_vector = vectors
            .pop()
            .ok_or_else(|| ToolsyError::Embedding("Embedder returned no vector".to_string()))?;
        if query_vector.len() != self.dimension {
            return Err(ToolsyError::Embedding(format!(
                "Query embedding has {} dimensions, index has {}",
                query_vector.len(),
                self.dimension
            )));
        }

        // One extra hit shows whether the distance group at the k-th place continues
        let mut limit = (k + 1).min(total);
        let mut hits = loop {
            let mut hits = self.search(&query_vector, limit).await?;
            hits.sort_by(RetrievedChunk::nearest_first);

            let boundary_closed = match (hits.get(k - 1), hits.last()) {
                (Some(kth), Some(last)) => hits.len() <= k || last.distance > kth.distance,
                _ => true,
            };
            if boundary_closed || limit >= total {
                break hits;
            }

            debug!("Distance tie at rank {}, widening search to {}", k, limit * 2);
            limit = (limit * 2).min(total);
        };

        hits.truncate(k);
        Ok(hits)
    }

    async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<RetrievedChunk>> {
        let results = self
            .table
            .vector_search(query_vector)
            .map_err(|e| ToolsyError::Storage(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::L2)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| ToolsyError::Storage(format!("Failed to execute search: {}", e)))?;

        parse_search_results_stream(results).await
    }
}

/// Removes the lock file when the build finishes or fails
struct BuildLock {
    path: PathBuf,
}

impl BuildLock {
    fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(BUILD_LOCK_FILE);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    ToolsyError::Storage(format!(
                        "An index build is already in progress (remove {:?} if it is stale)",
                        path
                    ))
                } else {
                    ToolsyError::Storage(format!("Failed to create build lock file: {}", e))
                }
            })?;
        writeln!(file, "{}", chrono::Utc::now().to_rfc3339())?;

        Ok(Self { path })
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove build lock file {:?}: {}", self.path, e);
        }
    }
}

async fn connect(path: &Path) -> Result<Connection> {
    let uri = path.to_string_lossy();
    lancedb::connect(&uri)
        .execute()
        .await
        .map_err(|e| ToolsyError::Storage(format!("Failed to connect to LanceDB: {}", e)))
}

async fn drop_table_if_exists(connection: &Connection) -> Result<()> {
    let table_names = connection
        .table_names()
        .execute()
        .await
        .map_err(|e| ToolsyError::Storage(format!("Failed to list tables for drop: {}", e)))?;

    if table_names.iter().any(|name| name == TABLE_NAME) {
        info!("Dropping existing {} table", TABLE_NAME);
        connection
            .drop_table(TABLE_NAME)
            .await
            .map_err(|e| ToolsyError::Storage(format!("Failed to drop table: {}", e)))?;
    }

    Ok(())
}

/// Run the blocking embedder off the async runtime
async fn embed_blocking(embedder: Arc<dyn Embedder>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let expected = texts.len();
    let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| ToolsyError::Embedding(format!("Embedding task failed: {}", e)))?
        .map_err(|e| ToolsyError::Embedding(format!("{:#}", e)))?;

    if vectors.len() != expected {
        return Err(ToolsyError::Embedding(format!(
            "Expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    Ok(vectors)
}

fn index_entries(chunks: &[Chunk], vectors: Vec<Vec<f32>>) -> Result<Vec<IndexedEntry>> {
    let dimension = vectors.first().map_or(0, Vec::len);
    if dimension == 0 {
        return Err(ToolsyError::Embedding(
            "Embedder returned empty vectors".to_string(),
        ));
    }

    chunks
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(position, (chunk, vector))| {
            if vector.len() != dimension {
                return Err(ToolsyError::Embedding(format!(
                    "Inconsistent embedding dimensions: {} vs {}",
                    vector.len(),
                    dimension
                )));
            }
            Ok(IndexedEntry {
                chunk: chunk.clone(),
                vector,
                position: to_u32(position)?,
            })
        })
        .collect()
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ToolsyError::Storage(format!("Value {} does not fit the index schema", value)))
}

/// Create schema with the specified vector dimension
fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("position", DataType::UInt32, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("tool_id", DataType::Utf8, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("content", DataType::Utf8, false),
    ]))
}

fn create_record_batch(entries: &[IndexedEntry], schema: Arc<Schema>) -> Result<RecordBatch> {
    let len = entries.len();
    let vector_dim = entries.first().map_or(0, IndexedEntry::dimension);

    let mut ids = Vec::with_capacity(len);
    let mut positions = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);
    let mut tool_ids = Vec::with_capacity(len);
    let mut names = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);

    for entry in entries {
        ids.push(entry.chunk.id());
        positions.push(entry.position);
        flat_values.extend_from_slice(&entry.vector);
        tool_ids.push(entry.chunk.tool_id.as_str());
        names.push(entry.chunk.name.as_str());
        sources.push(entry.chunk.source.as_str());
        chunk_indices.push(to_u32(entry.chunk.chunk_index)?);
        contents.push(entry.chunk.text.as_str());
    }

    let values_array = Float32Array::from(flat_values);
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, vector_dim as i32, Arc::new(values_array), None)
            .map_err(|e| ToolsyError::Storage(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(UInt32Array::from(positions)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(tool_ids)),
        Arc::new(StringArray::from(names)),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(contents)),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| ToolsyError::Storage(format!("Failed to create record batch: {}", e)))
}

async fn detect_vector_dimension(table: &Table) -> Result<usize> {
    let schema = table
        .schema()
        .await
        .map_err(|e| ToolsyError::Storage(format!("Failed to get table schema: {}", e)))?;

    for field in schema.fields() {
        if field.name() == "vector" {
            if let DataType::FixedSizeList(_, size) = field.data_type() {
                return Ok(*size as usize);
            }
        }
    }

    Err(ToolsyError::Storage(
        "Could not find vector column or determine dimension".to_string(),
    ))
}

async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<RetrievedChunk>> {
    let mut hits = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| ToolsyError::Storage(format!("Failed to read result stream: {}", e)))?
    {
        hits.extend(parse_search_batch(&batch)?);
    }

    Ok(hits)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ToolsyError::Storage(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| ToolsyError::Storage(format!("Invalid {} column type", name)))
}

fn u32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a UInt32Array> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ToolsyError::Storage(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| ToolsyError::Storage(format!("Invalid {} column type", name)))
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<RetrievedChunk>> {
    let positions = u32_column(batch, "position")?;
    let tool_ids = string_column(batch, "tool_id")?;
    let names = string_column(batch, "name")?;
    let sources = string_column(batch, "source")?;
    let chunk_indices = u32_column(batch, "chunk_index")?;
    let contents = string_column(batch, "content")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| ToolsyError::Storage("Missing _distance column".to_string()))?;

    Ok((0..batch.num_rows())
        .map(|row| RetrievedChunk {
            chunk: Chunk {
                tool_id: tool_ids.value(row).to_string(),
                name: names.value(row).to_string(),
                source: sources.value(row).to_string(),
                chunk_index: chunk_indices.value(row) as usize,
                text: contents.value(row).to_string(),
            },
            distance: distances.value(row),
            position: positions.value(row),
        })
        .collect())
}
