//! # Префетч соседних чанков
//!
//! Держит "теплым" окно метаданных предложений и первых байт аудио вокруг
//! текущей позиции воспроизведения. Все запросы спекулятивные: ошибки только
//! логируются, повторы ограничиваются через [`RequestGate`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, info};
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CACHE_CONTROL, RANGE};

use crate::cache::{Clock, RequestGate, SentenceCache};
use crate::config::{PlaybackMode, PrefetchConfig};
use crate::error::{ReaderError, ReaderResult};
use crate::models::{parse_sentence_payload, AudioToggles, MediaChunk, SentenceMetadata};
use crate::storage_url::StorageUrlResolver;

/// Сетевой транспорт префетчера
#[async_trait]
pub trait PrefetchTransport: Send + Sync {
    /// GET метаданных чанка (без кэша браузера/прокси)
    async fn fetch_sentences(
        &self,
        url: &str,
        timeout: Duration,
    ) -> ReaderResult<Vec<SentenceMetadata>>;

    /// Короткий Range-запрос для прогрева соединения и кэша
    async fn probe(&self, url: &str, range: &str, timeout: Duration) -> ReaderResult<()>;
}

/// Транспорт на reqwest
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_sentences(&self, url: &str) -> ReaderResult<Vec<SentenceMetadata>> {
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-store")
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReaderError::Api {
                status: status.as_u16(),
                message: format!("metadata request failed for {}", url),
            });
        }

        let body = response.bytes().await?;
        parse_sentence_payload(&body)
    }

    async fn get_range(&self, url: &str, range: &str) -> ReaderResult<()> {
        let response = self
            .client
            .get(url)
            .header(RANGE, range)
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReaderError::Api {
                status: status.as_u16(),
                message: format!("range probe failed for {}", url),
            });
        }
        // Тело не читаем: достаточно, что соединение и первые байты прогреты
        Ok(())
    }
}

#[async_trait]
impl PrefetchTransport for HttpTransport {
    async fn fetch_sentences(
        &self,
        url: &str,
        timeout: Duration,
    ) -> ReaderResult<Vec<SentenceMetadata>> {
        tokio::time::timeout(timeout, self.get_sentences(url))
            .await
            .map_err(|_| ReaderError::Timeout(timeout))?
    }

    async fn probe(&self, url: &str, range: &str, timeout: Duration) -> ReaderResult<()> {
        tokio::time::timeout(timeout, self.get_range(url, range))
            .await
            .map_err(|_| ReaderError::Timeout(timeout))?
    }
}

/// Чанки, которые нужно держать загруженными вокруг предложения `active_sentence`.
///
/// Берутся чанки, содержащие номера `active_sentence ± radius`. Если ни один
/// чанк не совпал по диапазонам, берутся ±radius чанков по позиции в списке.
/// Результат не длиннее `2 * radius + 1`.
pub fn prefetch_targets(
    chunks: &[MediaChunk],
    active_index: usize,
    active_sentence: Option<usize>,
    radius: usize,
) -> Vec<usize> {
    let mut targets = Vec::new();
    if chunks.is_empty() {
        return targets;
    }

    if let Some(sentence) = active_sentence {
        let low = sentence.saturating_sub(radius);
        for number in low..=sentence + radius {
            if let Some(index) = chunks.iter().position(|c| c.contains_sentence(number)) {
                if !targets.contains(&index) {
                    targets.push(index);
                }
            }
        }
    }

    if targets.is_empty() {
        let active = active_index.min(chunks.len() - 1);
        let low = active.saturating_sub(radius);
        let high = (active + radius).min(chunks.len() - 1);
        targets.extend(low..=high);
    }

    targets
}

/// Входные данные для одного прохода префетча
#[derive(Debug, Clone, Copy)]
pub struct PrefetchContext<'a> {
    pub chunks: &'a [MediaChunk],
    pub active_index: usize,
    /// Индекс предложения внутри активного чанка
    pub sentence_index: usize,
    pub toggles: AudioToggles,
}

/// Запросы, которые прошли через дедупликацию и готовы к отправке
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchPlan {
    /// (ключ чанка, URL метаданных)
    pub metadata: Vec<(String, String)>,
    /// URL аудио для Range-пробы
    pub audio: Vec<String>,
}

impl PrefetchPlan {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.audio.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub metadata_requests: usize,
    pub audio_requests: usize,
    pub metadata_loaded: usize,
    pub audio_warmed: usize,
}

pub struct ChunkPrefetcher {
    transport: Arc<dyn PrefetchTransport>,
    resolver: StorageUrlResolver,
    config: PrefetchConfig,
    mode: PlaybackMode,
    metadata_gate: RequestGate<String>,
    audio_gate: RequestGate<String>,
    sentences: SentenceCache,
    last_trigger: Mutex<Option<(String, Option<usize>)>>,
}

impl ChunkPrefetcher {
    pub fn new(
        transport: Arc<dyn PrefetchTransport>,
        resolver: StorageUrlResolver,
        config: PrefetchConfig,
        clock: Arc<dyn Clock>,
        mode: PlaybackMode,
    ) -> Self {
        Self {
            metadata_gate: RequestGate::new(config.metadata_retry_interval(), clock.clone()),
            audio_gate: RequestGate::new(config.audio_retry_interval(), clock),
            transport,
            resolver,
            config,
            mode,
            sentences: SentenceCache::new(),
            last_trigger: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Кэшированные предложения чанка
    pub fn cached_sentences(&self, chunk_key: &str) -> Option<Arc<Vec<SentenceMetadata>>> {
        self.sentences.get(chunk_key)
    }

    /// Положить предложения, полученные другим путем (например, с основным медиа-списком)
    pub fn seed_sentences(&self, chunk_key: &str, sentences: Vec<SentenceMetadata>) -> bool {
        self.sentences.insert(chunk_key, sentences)
    }

    pub fn is_audio_warm(&self, url: &str) -> bool {
        self.audio_gate.is_completed(&url.to_string())
    }

    /// Сбросить запомненное предложение, чтобы следующий `plan` отработал заново
    pub fn reset_trigger(&self) {
        *self.last_trigger.lock() = None;
    }

    /// Синхронная часть прохода: решить, что запрашивать, и пометить ключи "в полете".
    ///
    /// Возвращает `None`, если префетч отключен или активное предложение не изменилось.
    pub fn plan(&self, ctx: &PrefetchContext<'_>) -> Option<PrefetchPlan> {
        if self.mode != PlaybackMode::Online || ctx.chunks.is_empty() {
            return None;
        }

        let active_index = ctx.active_index.min(ctx.chunks.len() - 1);
        let active_chunk = &ctx.chunks[active_index];
        let active_sentence = active_chunk.sentence_number_at(ctx.sentence_index);

        {
            let trigger = (active_chunk.key(), active_sentence);
            let mut last = self.last_trigger.lock();
            if last.as_ref() == Some(&trigger) {
                return None;
            }
            *last = Some(trigger);
        }

        let targets = prefetch_targets(
            ctx.chunks,
            active_index,
            active_sentence,
            self.config.radius,
        );
        debug!(
            "Prefetch window around sentence {:?}: chunks {:?}",
            active_sentence, targets
        );

        let mut plan = PrefetchPlan::default();
        for index in targets {
            let chunk = &ctx.chunks[index];
            self.plan_metadata(chunk, &mut plan);
            self.plan_audio(chunk, ctx.toggles, &mut plan);
        }
        Some(plan)
    }

    fn plan_metadata(&self, chunk: &MediaChunk, plan: &mut PrefetchPlan) {
        if chunk.has_sentences() {
            return;
        }
        let key = chunk.key();
        if self.sentences.contains(&key) {
            return;
        }
        let Some(url) = chunk
            .metadata_location()
            .and_then(|location| self.resolver.resolve(&location))
        else {
            return;
        };

        match self.metadata_gate.try_begin(&key) {
            Ok(()) => plan.metadata.push((key, url)),
            Err(reason) => debug!("Skip metadata for {}: {:?}", key, reason),
        }
    }

    fn plan_audio(&self, chunk: &MediaChunk, toggles: AudioToggles, plan: &mut PrefetchPlan) {
        let Some(url) = chunk
            .audio_tracks
            .select(toggles)
            .and_then(|track| track.location())
            .and_then(|location| self.resolver.resolve(location))
        else {
            return;
        };
        if plan.audio.contains(&url) {
            return;
        }

        match self.audio_gate.try_begin(&url) {
            Ok(()) => plan.audio.push(url),
            Err(reason) => debug!("Skip audio probe for {}: {:?}", url, reason),
        }
    }

    /// Асинхронная часть прохода: отправить все запросы плана параллельно
    pub async fn execute(&self, plan: PrefetchPlan) -> PrefetchReport {
        let mut report = PrefetchReport {
            metadata_requests: plan.metadata.len(),
            audio_requests: plan.audio.len(),
            ..Default::default()
        };
        if plan.is_empty() {
            return report;
        }

        let timeout = self.config.metadata_timeout();
        let range = self.config.probe_range_header();

        let metadata = join_all(
            plan.metadata
                .iter()
                .map(|(key, url)| self.load_metadata(key, url, timeout)),
        );
        let audio = join_all(plan.audio.iter().map(|url| self.warm_audio(url, &range, timeout)));
        let (metadata, audio) = futures::join!(metadata, audio);

        report.metadata_loaded = metadata.into_iter().filter(|ok| *ok).count();
        report.audio_warmed = audio.into_iter().filter(|ok| *ok).count();

        if report.metadata_loaded > 0 || report.audio_warmed > 0 {
            info!(
                "Prefetched {} metadata and {} audio chunks",
                report.metadata_loaded, report.audio_warmed
            );
        }
        report
    }

    /// `plan` + `execute` одним вызовом
    pub async fn update(&self, ctx: &PrefetchContext<'_>) -> PrefetchReport {
        match self.plan(ctx) {
            Some(plan) => self.execute(plan).await,
            None => PrefetchReport::default(),
        }
    }

    async fn load_metadata(&self, key: &str, url: &str, timeout: Duration) -> bool {
        let key_owned = key.to_string();
        match self.transport.fetch_sentences(url, timeout).await {
            Ok(sentences) if !sentences.is_empty() => {
                if !self.sentences.insert(key, sentences) {
                    debug!("Metadata for {} already cached, keeping first copy", key);
                }
                self.metadata_gate.finish(&key_owned, true);
                true
            }
            Ok(_) => {
                debug!("Metadata for {} came back empty", key);
                self.metadata_gate.finish(&key_owned, false);
                false
            }
            Err(e) => {
                debug!("Metadata prefetch for {} failed: {}", key, e);
                self.metadata_gate.finish(&key_owned, false);
                false
            }
        }
    }

    async fn warm_audio(&self, url: &str, range: &str, timeout: Duration) -> bool {
        let key = url.to_string();
        match self.transport.probe(url, range, timeout).await {
            Ok(()) => {
                self.audio_gate.finish(&key, true);
                true
            }
            Err(e) => {
                debug!("Audio probe for {} failed: {}", url, e);
                self.audio_gate.finish(&key, false);
                false
            }
        }
    }
}
