use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;

use crate::config::SearchConfig;

/// External full-text index of studies.
#[async_trait::async_trait]
pub trait StudyIndexer: Send + Sync {
    async fn index_study(&self, study_id: &str, document: &Value) -> Result<()>;
    async fn remove_study(&self, study_id: &str) -> Result<()>;
}

/// Indexer speaking the Elasticsearch document API over HTTP
#[derive(Debug, Clone)]
pub struct HttpStudyIndexer {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

impl HttpStudyIndexer {
    pub fn new(base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.url.clone(), config.index.clone()))
    }

    fn document_url(&self, study_id: &str) -> String {
        format!("{}/{}/_doc/{}", self.base_url, self.index, study_id)
    }
}

#[async_trait::async_trait]
impl StudyIndexer for HttpStudyIndexer {
    async fn index_study(&self, study_id: &str, document: &Value) -> Result<()> {
        self.client
            .put(self.document_url(study_id))
            .json(document)
            .send()
            .await
            .context("Failed to reach search index")?
            .error_for_status()
            .context("Search index rejected study document")?;
        Ok(())
    }

    async fn remove_study(&self, study_id: &str) -> Result<()> {
        self.client
            .delete(self.document_url(study_id))
            .send()
            .await
            .context("Failed to reach search index")?
            .error_for_status()
            .context("Search index rejected study removal")?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndexJob {
    Upsert { study_id: String, document: Value },
    Remove { study_id: String },
}

/// Run an index job in the background. Failures are logged and never reach
/// the request that triggered them.
pub fn spawn_index_task(indexer: Arc<dyn StudyIndexer>, job: IndexJob) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (study_id, result) = match &job {
            IndexJob::Upsert { study_id, document } => (study_id, indexer.index_study(study_id, document).await),
            IndexJob::Remove { study_id } => (study_id, indexer.remove_study(study_id).await),
        };
        match result {
            Ok(()) => log::debug!("Indexed study {}", study_id),
            Err(e) => log::warn!("Search indexing failed for study {}: {:#}", study_id, e),
        }
    })
}
