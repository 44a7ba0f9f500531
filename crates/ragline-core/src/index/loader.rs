//! Source document loading (PDF and plain text)

use crate::error::{RaglineError, Result};
use std::path::{Path, PathBuf};

/// Raw text of one source file, or of one page of a PDF
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path the text was read from
    pub source: String,
    /// Zero-based page number for paged formats
    pub page: Option<usize>,
    pub text: String,
}

/// File kinds the loader understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("pdf") {
            Some(Self::Pdf)
        } else if ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md") {
            Some(Self::PlainText)
        } else {
            None
        }
    }
}

const PATTERNS: [&str; 3] = ["*.pdf", "*.txt", "*.md"];

/// List loadable files directly inside `dir`, sorted by path
pub fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in PATTERNS {
        let full = dir.join(pattern);
        let full = full.to_string_lossy();
        let options = glob::MatchOptions {
            case_sensitive: false,
            ..Default::default()
        };
        for entry in glob::glob_with(&full, options)? {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable entry: {}", e),
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Extract the text of each page of a PDF file
///
/// Extraction runs on the blocking pool; a panic inside the PDF parser is
/// reported as a parse error for that file only.
async fn extract_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        RaglineError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read PDF file {:?}: {}", path, e),
        ))
    })?;

    let display = path.display().to_string();
    let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&bytes))
        .await
        .map_err(|e| RaglineError::Parse(format!("PDF parser crashed on {}: {}", display, e)))?
        .map_err(|e| {
            RaglineError::Parse(format!("Failed to extract text from PDF {:?}: {}", path, e))
        })?;

    if pages.iter().all(|page| page.trim().is_empty()) {
        return Err(RaglineError::Parse(format!(
            "PDF file {:?} contains no extractable text (may be image-based)",
            path
        )));
    }

    Ok(pages)
}

/// Load one file according to its kind
///
/// A PDF yields one document per page with text; other files yield one
/// document.
pub async fn load_file(path: &Path) -> Result<Vec<SourceDocument>> {
    let kind = DocumentKind::from_path(path).ok_or_else(|| {
        RaglineError::InvalidInput(format!("Unsupported document type: {:?}", path))
    })?;
    let source = path.to_string_lossy().to_string();

    match kind {
        DocumentKind::Pdf => Ok(extract_pdf_pages(path)
            .await?
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(page, text)| SourceDocument {
                source: source.clone(),
                page: Some(page),
                text,
            })
            .collect()),
        DocumentKind::PlainText => Ok(vec![SourceDocument {
            source,
            page: None,
            text: tokio::fs::read_to_string(path).await?,
        }]),
    }
}

/// Load every supported document in `dir`
///
/// A missing directory yields no documents. Files that fail to load are
/// skipped with a warning.
pub async fn load_documents(dir: &Path) -> Result<Vec<SourceDocument>> {
    if !dir.is_dir() {
        tracing::warn!("Source directory {:?} does not exist; no documents loaded", dir);
        return Ok(Vec::new());
    }

    let files = scan_directory(dir)?;
    if files.is_empty() {
        tracing::warn!("No PDF or text files found in {:?}", dir);
        return Ok(Vec::new());
    }

    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        tracing::info!("Processing: {}", path.display());
        match load_file(path).await {
            Ok(docs) => documents.extend(docs),
            Err(e) => tracing::warn!("Skipping {:?}: {}", path, e),
        }
    }

    tracing::info!(
        "Loaded {} documents from {} files",
        documents.len(),
        files.len()
    );
    Ok(documents)
}
