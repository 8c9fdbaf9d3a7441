//! Knowledge-base ingestion: read documents, chunk, embed, and swap them
//! into the vector index.
//!
//! Re-running ingestion for a source is idempotent: chunk boundaries are
//! deterministic and `replace_source` swaps the whole source atomically.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quick_xml::events::Event;
use walkdir::WalkDir;

use crate::errors::BotError;
use crate::llm::Embedder;

use super::chunker::chunk_text;
use super::store::VectorStore;

const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf", "docx"];

/// Outcome of a directory ingestion. Per-file failures are recorded here
/// instead of aborting the batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_ingested: usize,
    pub chunks_added: usize,
    pub skipped: Vec<(PathBuf, String)>,
}

pub struct IngestService {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl IngestService {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            chunk_size,
            chunk_overlap,
        }
    }

    /// Chunk, embed, and index raw text under `source_ref`, fully
    /// replacing whatever that source held before. Returns the chunk count.
    pub async fn ingest_text(&self, text: &str, source_ref: &str) -> Result<usize, BotError> {
        let mut chunks = chunk_text(text, source_ref, self.chunk_size, self.chunk_overlap)?;
        if chunks.is_empty() {
            tracing::warn!(source = source_ref, "no text to ingest");
            self.store.delete_by_source(source_ref).await?;
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(BotError::Internal(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = Some(vector);
        }

        self.store.replace_source(source_ref, &chunks).await?;
        tracing::info!(source = source_ref, chunks = chunks.len(), "ingested source");
        Ok(chunks.len())
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<usize, BotError> {
        let text = read_document(path)?;
        if text.trim().is_empty() {
            tracing::warn!(path = %path.display(), "no text extracted");
            return Ok(0);
        }
        self.ingest_text(&text, &path.to_string_lossy()).await
    }

    /// Ingest every supported file under `dir`. A file that fails to read
    /// or embed is reported and skipped; the batch continues.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport, BotError> {
        if !dir.is_dir() {
            return Err(BotError::NotFound(format!(
                "directory not found: {}",
                dir.display()
            )));
        }

        let mut report = IngestReport::default();
        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_supported(entry.path()) {
                continue;
            }

            match self.ingest_file(entry.path()).await {
                Ok(count) => {
                    report.files_ingested += 1;
                    report.chunks_added += count;
                }
                Err(err) => {
                    tracing::warn!(path = %entry.path().display(), error = %err, "skipping file");
                    report.skipped.push((entry.path().to_path_buf(), err.to_string()));
                }
            }
        }

        tracing::info!(
            files = report.files_ingested,
            chunks = report.chunks_added,
            skipped = report.skipped.len(),
            "directory ingestion finished"
        );
        Ok(report)
    }

    pub async fn clear_all(&self) -> Result<usize, BotError> {
        self.store.clear().await
    }

    pub async fn count(&self) -> Result<usize, BotError> {
        self.store.count().await
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Extract plain text from a document, dispatching on extension.
pub fn read_document(path: &Path) -> Result<String, BotError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "txt" | "md" => std::fs::read_to_string(path)
            .map_err(|e| BotError::Internal(format!("cannot read {}: {}", path.display(), e))),
        "pdf" => pdf_extract::extract_text(path)
            .map_err(|e| BotError::Internal(format!("PDF extraction failed: {}", e))),
        "docx" => {
            let bytes = std::fs::read(path)
                .map_err(|e| BotError::Internal(format!("cannot read {}: {}", path.display(), e)))?;
            extract_docx_text(&bytes)
        }
        other => Err(BotError::UnsupportedFormat(format!(
            "unsupported file type: .{} ({})",
            other,
            path.display()
        ))),
    }
}

/// Pull the `w:t` runs out of word/document.xml, breaking on paragraphs.
fn extract_docx_text(bytes: &[u8]) -> Result<String, BotError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| BotError::Internal(format!("not a valid docx archive: {}", e)))?;

    let mut xml = Vec::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| BotError::Internal(format!("word/document.xml missing: {}", e)))?
        .read_to_end(&mut xml)
        .map_err(BotError::internal)?;

    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(true);

    let mut out = String::new();
    let mut in_text_run = false;
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text_run = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text_run = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(t)) if in_text_run => {
                let text = t.unescape().map_err(BotError::internal)?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(BotError::Internal(format!("docx parse error: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::sqlite::SqliteVectorStore;
    use async_trait::async_trait;

    struct CountingEmbedder;

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, BotError> {
            Ok(inputs
                .iter()
                .map(|text| vec![text.chars().count() as f32, 1.0])
                .collect())
        }
    }

    async fn service() -> (IngestService, Arc<SqliteVectorStore>) {
        let tmp = std::env::temp_dir().join(format!(
            "concierge-ingest-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        let store = Arc::new(SqliteVectorStore::with_path(tmp).await.unwrap());
        let svc = IngestService::new(store.clone(), Arc::new(CountingEmbedder), 100, 20);
        (svc, store)
    }

    #[tokio::test]
    async fn ingest_text_is_idempotent() {
        let (svc, store) = service().await;

        let text = "Our store is open from nine to five. ".repeat(10);
        let first = svc.ingest_text(&text, "faq").await.unwrap();
        assert!(first > 0);
        let count_after_first = store.count().await.unwrap();

        let second = svc.ingest_text(&text, "faq").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.count().await.unwrap(), count_after_first);
    }

    #[tokio::test]
    async fn ingest_directory_skips_unsupported_and_continues() {
        let (svc, store) = service().await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Opening hours are 9 to 5.").unwrap();
        std::fs::write(dir.path().join("b.txt"), "Returns accepted for 30 days.").unwrap();
        std::fs::write(dir.path().join("ignored.bin"), [0u8, 1, 2]).unwrap();
        // Not a real PDF: extraction fails, file is reported and skipped.
        std::fs::write(dir.path().join("broken.pdf"), b"not a pdf").unwrap();

        let report = svc.ingest_directory(dir.path()).await.unwrap();
        assert_eq!(report.files_ingested, 2);
        assert_eq!(report.skipped.len(), 1);
        assert!(store.count().await.unwrap() >= 2);
    }

    #[tokio::test]
    async fn unsupported_extension_is_reported() {
        let err = read_document(Path::new("slides.pptx")).unwrap_err();
        assert!(matches!(err, BotError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn empty_text_clears_previous_source() {
        let (svc, store) = service().await;

        svc.ingest_text("real content here", "doc").await.unwrap();
        assert!(store.count().await.unwrap() > 0);

        let count = svc.ingest_text("   ", "doc").await.unwrap();
        assert_eq!(count, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
