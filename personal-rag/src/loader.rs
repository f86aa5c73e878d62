//! Document loading from local text files and web pages.
//!
//! Local paths are fatal when unreadable. URLs are fetched one by one and
//! each failure is recorded in the [`LoadReport`] instead of aborting the load.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::document::{Document, DocumentSource, SOURCE_KEY};
use crate::error::{RagError, Result};

/// The result of fetching a single URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UrlOutcome {
    /// The page was fetched and converted to a document.
    Loaded {
        /// The fetched URL.
        url: String,
    },
    /// The page was skipped.
    Failed {
        /// The URL that failed.
        url: String,
        /// Why it failed.
        error: String,
    },
}

impl UrlOutcome {
    /// Returns `true` for [`UrlOutcome::Failed`].
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Documents produced by a load, plus what happened to every URL.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Loaded documents: local files first (sorted by path), then URLs in
    /// configuration order.
    pub documents: Vec<Document>,
    /// One entry per configured URL, in configuration order.
    pub url_outcomes: Vec<UrlOutcome>,
}

impl LoadReport {
    /// URLs that were skipped because they failed.
    pub fn failed_urls(&self) -> impl Iterator<Item = &UrlOutcome> {
        self.url_outcomes.iter().filter(|o| o.is_failed())
    }
}

/// A source of documents for the indexer.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Load every configured source.
    async fn load(&self) -> Result<LoadReport>;
}

/// Loads text files from a path and pages from a list of URLs.
///
/// A directory path loads every regular file directly inside it whose
/// extension is in `text_extensions` (non-recursive). A file path loads that
/// one file whatever its extension.
pub struct DocumentLoader {
    path: Option<PathBuf>,
    urls: Vec<String>,
    extensions: Vec<String>,
    client: reqwest::Client,
}

impl DocumentLoader {
    /// Create a loader for the given path and URLs.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the HTTP client cannot be built.
    pub fn new(
        path: Option<PathBuf>,
        urls: Vec<String>,
        user_agent: &str,
        extensions: Vec<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.to_string())
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {e}")))?;
        let extensions = extensions.into_iter().map(|e| e.to_ascii_lowercase()).collect();
        Ok(Self { path, urls, extensions, client })
    }

    /// Create a loader from the source settings of a [`RagConfig`].
    pub fn from_config(config: &RagConfig) -> Result<Self> {
        Self::new(
            Some(config.source_path.clone()),
            config.urls.clone(),
            &config.user_agent,
            config.text_extensions.clone(),
        )
    }

    fn has_text_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == &ext.to_ascii_lowercase()))
    }

    async fn load_path(&self, path: &Path) -> Result<Vec<Document>> {
        let meta = tokio::fs::metadata(path).await.map_err(|e| load_error(path, e))?;
        if meta.is_file() {
            return Ok(vec![read_text_file(path).await?]);
        }

        let mut entries = tokio::fs::read_dir(path).await.map_err(|e| load_error(path, e))?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| load_error(path, e))? {
            let file_path = entry.path();
            // follows symlinks
            let is_file =
                tokio::fs::metadata(&file_path).await.map(|m| m.is_file()).unwrap_or(false);
            if is_file && self.has_text_extension(&file_path) {
                files.push(file_path);
            }
        }
        files.sort();

        let mut documents = Vec::with_capacity(files.len());
        for file in files {
            documents.push(read_text_file(&file).await?);
        }
        Ok(documents)
    }

    async fn fetch_url(&self, url: &str) -> std::result::Result<Document, String> {
        let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        let body = response.text().await.map_err(|e| e.to_string())?;

        let mut document = if content_type.contains("html") {
            html_to_document(&body, url)
        } else {
            Document::new(body, DocumentSource::Url(url.to_string()))
        };
        document.metadata.insert(SOURCE_KEY.to_string(), url.to_string());
        document.metadata.insert("content_type".to_string(), content_type);
        Ok(document)
    }
}

#[async_trait]
impl Loader for DocumentLoader {
    async fn load(&self) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        if let Some(path) = &self.path {
            report.documents = self.load_path(path).await?;
            debug!(path = %path.display(), count = report.documents.len(), "loaded local documents");
        }

        for url in &self.urls {
            match self.fetch_url(url).await {
                Ok(document) => {
                    report.documents.push(document);
                    report.url_outcomes.push(UrlOutcome::Loaded { url: url.clone() });
                }
                Err(error) => {
                    warn!(url = %url, error = %error, "failed to load url, skipping");
                    report.url_outcomes.push(UrlOutcome::Failed { url: url.clone(), error });
                }
            }
        }

        info!(
            document_count = report.documents.len(),
            failed_urls = report.failed_urls().count(),
            "document load finished"
        );
        Ok(report)
    }
}

fn load_error(path: &Path, e: std::io::Error) -> RagError {
    RagError::Load { source_id: path.display().to_string(), message: e.to_string() }
}

async fn read_text_file(path: &Path) -> Result<Document> {
    let bytes = tokio::fs::read(path).await.map_err(|e| load_error(path, e))?;
    let text = String::from_utf8(bytes).map_err(|e| RagError::Load {
        source_id: path.display().to_string(),
        message: format!("not valid UTF-8: {e}"),
    })?;
    let source = path.display().to_string();
    let mut document = Document::new(text, DocumentSource::File(source.clone()));
    document.metadata.insert(SOURCE_KEY.to_string(), source);
    Ok(document)
}

/// Extract the visible text of an HTML page, plus its `<title>` if present.
fn html_to_document(html: &str, url: &str) -> Document {
    let page = Html::parse_document(html);
    let mut document = Document::new(String::new(), DocumentSource::Url(url.to_string()));

    if let Ok(title_selector) = Selector::parse("title") {
        if let Some(title) = page.select(&title_selector).next() {
            let title = title.text().collect::<String>().trim().to_string();
            if !title.is_empty() {
                document.metadata.insert("title".to_string(), title);
            }
        }
    }

    let mut content = String::new();
    if let Ok(body_selector) = Selector::parse("body") {
        if let Some(body) = page.select(&body_selector).next() {
            for text in body.text() {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !content.is_empty() {
                        content.push(' ');
                    }
                    content.push_str(trimmed);
                }
            }
        }
    }
    document.text = content;
    document
}
