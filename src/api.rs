//! # HTTP клиент backend-а
//!
//! Действия, инициированные пользователем: отправка пайплайна, список медиа
//! задания, загрузка метаданных чанка и lookup выделенного текста. В отличие
//! от префетча, ошибки здесь возвращаются вызывающему и показываются рядом
//! с кнопкой, которая их вызвала.

use std::time::Duration;

use log::{debug, error, info};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ReaderConfig;
use crate::error::{ReaderError, ReaderResult};
use crate::models::{parse_sentence_payload, MediaChunk, MediaItem, SentenceMetadata};
use crate::pipeline::{PipelineRequest, PipelineSubmission};
use crate::storage_url::StorageUrlResolver;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Медиа, уже сгенерированные для задания
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobMedia {
    pub items: Vec<MediaItem>,
    pub chunks: Vec<MediaChunk>,
    /// Задание завершено и новых медиа не будет
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
struct LookupPayload<'a> {
    query: &'a str,
    input_language: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    llm_model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<&'a str>,
}

/// Ответ ассистента на lookup
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LookupResponse {
    pub answer: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Необязательные параметры lookup
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    pub llm_model: Option<String>,
    pub system_prompt: Option<String>,
}

/// Текст ошибки из тела ответа: `{"detail": "..."}`, список
/// `{"detail": [{"msg": "..."}]}` или `{"error": "..."}`.
pub fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let detail = value.get("detail").or_else(|| value.get("error"))?;

    let message = match detail {
        Value::String(s) => s.clone(),
        Value::Array(entries) => entries
            .iter()
            .filter_map(|e| e.get("msg").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("; "),
        _ => return None,
    };

    let message = message.trim().to_string();
    if message.is_empty() {
        None
    } else {
        Some(message)
    }
}

pub struct BackendClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    storage: StorageUrlResolver,
}

impl BackendClient {
    pub fn new(config: &ReaderConfig) -> ReaderResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Self::with_client(client, config)
    }

    pub fn with_client(client: Client, config: &ReaderConfig) -> ReaderResult<Self> {
        Ok(Self {
            client,
            base_url: config.api_base_url.trim().trim_end_matches('/').to_string(),
            token: config.access_token.clone().filter(|t| !t.trim().is_empty()),
            storage: StorageUrlResolver::from_config(config)?,
        })
    }

    pub fn storage(&self) -> &StorageUrlResolver {
        &self.storage
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> ReaderResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!("Backend error: HTTP {}, body: {}", status, body);
        let message = error_detail(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });
        Err(ReaderError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Проверить форму и создать задание
    pub async fn submit_pipeline(
        &self,
        request: &PipelineRequest,
    ) -> ReaderResult<PipelineSubmission> {
        request.validate()?;

        debug!("Submitting pipeline for {}", request.input_file);
        let response = self
            .authorized(self.client.post(self.endpoint("api/pipelines")))
            .json(request)
            .send()
            .await?;
        let submission: PipelineSubmission = Self::check(response).await?.json().await?;
        info!("Pipeline job {} submitted", submission.job_id);
        Ok(submission)
    }

    pub async fn list_job_media(&self, job_id: &str) -> ReaderResult<JobMedia> {
        let path = format!("api/pipelines/{}/media", job_id);
        let response = self
            .authorized(self.client.get(self.endpoint(&path)))
            .send()
            .await?;
        let media: JobMedia = Self::check(response).await?.json().await?;
        debug!(
            "Job {}: {} media items, {} chunks",
            job_id,
            media.items.len(),
            media.chunks.len()
        );
        Ok(media)
    }

    /// Явная загрузка метаданных чанка (при открытии, не спекулятивно)
    pub async fn fetch_chunk_sentences(
        &self,
        chunk: &MediaChunk,
    ) -> ReaderResult<Vec<SentenceMetadata>> {
        let location = chunk.metadata_location().ok_or_else(|| {
            ReaderError::InvalidFormat(format!("chunk {} has no metadata location", chunk.key()))
        })?;
        let url = self.storage.resolve(&location).ok_or_else(|| {
            ReaderError::InvalidFormat(format!("cannot resolve metadata location {}", location))
        })?;

        let response = self.client.get(&url).send().await?;
        let body = Self::check(response).await?.bytes().await?;
        parse_sentence_payload(&body)
    }

    /// Определение/перевод выделенного текста
    pub async fn lookup(
        &self,
        text: &str,
        language: &str,
        options: &LookupOptions,
    ) -> ReaderResult<LookupResponse> {
        let query = text.trim();
        if query.is_empty() {
            return Err(ReaderError::Validation("Select some text to look up.".to_string()));
        }

        let payload = LookupPayload {
            query,
            input_language: language,
            llm_model: options.llm_model.as_deref(),
            system_prompt: options.system_prompt.as_deref(),
        };
        let response = self
            .authorized(self.client.post(self.endpoint("api/assistant/lookup")))
            .json(&payload)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }
}
