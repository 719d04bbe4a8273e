//! # Интерактивный просмотрщик
//!
//! Связывает список чанков задания, синхронизацию текста, префетч соседей,
//! память позиции и управление воспроизведением. Снаружи приходят события
//! плеера и ввод пользователя, наружу уходит [`ViewModel`] для рендера.

use std::sync::Arc;

use log::{debug, info};
use tokio::task::JoinHandle;

use crate::config::PlaybackMode;
use crate::error::ReaderResult;
use crate::media_memory::{MediaMemoryStore, ResumePoint};
use crate::models::{
    AudioToggles, CueVisibility, MediaChunk, MediaItem, MediaType, TokenSelection, VariantKind,
};
use crate::playback::{PlaybackEvent, PlaybackHandle};
use crate::prefetch::{ChunkPrefetcher, PrefetchContext, PrefetchReport};
use crate::sync::{KeyOutcome, NavKey, SyncInput, SyncResolver, ViewModel};

/// Медиа-элемент, под которым запоминается позиция чанка
pub fn chunk_media_item(
    chunk: &MediaChunk,
    media_type: MediaType,
    toggles: AudioToggles,
) -> MediaItem {
    let key = chunk.key();
    MediaItem {
        id: Some(key.clone()),
        name: key,
        url: chunk
            .audio_tracks
            .select(toggles)
            .and_then(|track| track.location())
            .map(str::to_string),
        path: None,
        media_type,
        chunk_id: chunk.chunk_id.clone(),
    }
}

pub struct InteractiveViewer {
    job_id: String,
    media_type: MediaType,
    chunks: Vec<MediaChunk>,
    active_index: usize,
    resolver: SyncResolver,
    visibility: CueVisibility,
    toggles: AudioToggles,
    prefetcher: Option<Arc<ChunkPrefetcher>>,
    pending_prefetch: Option<JoinHandle<PrefetchReport>>,
    memory: MediaMemoryStore,
    playback: Option<PlaybackHandle>,
    is_playing: bool,
}

impl InteractiveViewer {
    pub fn new(
        job_id: impl Into<String>,
        media_type: MediaType,
        chunks: Vec<MediaChunk>,
        memory: MediaMemoryStore,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            media_type,
            chunks,
            active_index: 0,
            resolver: SyncResolver::new(),
            visibility: CueVisibility::default(),
            toggles: AudioToggles::default(),
            prefetcher: None,
            pending_prefetch: None,
            memory,
            playback: None,
            is_playing: false,
        }
    }

    /// Подключить префетчер. В офлайн-режиме он не используется.
    pub fn with_prefetcher(mut self, prefetcher: Arc<ChunkPrefetcher>) -> Self {
        if prefetcher.mode() == PlaybackMode::Online {
            self.prefetcher = Some(prefetcher);
        } else {
            debug!("Offline playback for job {}, prefetch disabled", self.job_id);
        }
        self
    }

    pub fn with_playback(mut self, playback: PlaybackHandle) -> Self {
        self.playback = Some(playback);
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn chunks(&self) -> &[MediaChunk] {
        &self.chunks
    }

    pub fn active_index(&self) -> usize {
        self.active_index
    }

    pub fn active_chunk(&self) -> Option<&MediaChunk> {
        self.chunks.get(self.active_index)
    }

    pub fn resolver(&self) -> &SyncResolver {
        &self.resolver
    }

    pub fn visibility(&self) -> CueVisibility {
        self.visibility
    }

    pub fn set_visibility(&mut self, kind: VariantKind, visible: bool) {
        self.visibility.set(kind, visible);
    }

    pub fn toggles(&self) -> AudioToggles {
        self.toggles
    }

    pub fn set_audio_toggles(&mut self, toggles: AudioToggles) {
        self.toggles = toggles;
        if let Some(prefetcher) = &self.prefetcher {
            prefetcher.reset_trigger();
        }
    }

    /// Обновленный список чанков (задание еще генерирует медиа).
    /// Активный чанк сохраняется по ключу, загруженные предложения переносятся.
    pub fn replace_chunks(&mut self, mut chunks: Vec<MediaChunk>) {
        let active_key = self.active_chunk().map(MediaChunk::key);
        for chunk in chunks.iter_mut() {
            let key = chunk.key();
            if let Some(old) = self.chunks.iter().find(|old| old.key() == key) {
                chunk.hydrate(&old.sentences);
            }
        }
        self.chunks = chunks;
        self.active_index = active_key
            .and_then(|key| self.chunks.iter().position(|c| c.key() == key))
            .unwrap_or(0);
        self.hydrate_from_cache();
    }

    /// Сделать чанк активным. Состояние синхронизации сбросится на следующем шаге.
    pub fn open_chunk(&mut self, index: usize) -> bool {
        if index >= self.chunks.len() {
            return false;
        }
        self.active_index = index;
        self.resolver.clear_manual();
        self.hydrate_from_cache();
        if let Some(prefetcher) = &self.prefetcher {
            prefetcher.reset_trigger();
        }
        info!("Opened chunk {} for job {}", self.chunks[index].key(), self.job_id);
        true
    }

    /// Следующий чанк (по окончании аудио или по запросу родителя)
    pub fn advance_chunk(&mut self) -> bool {
        let next = self.active_index + 1;
        if !self.open_chunk(next) {
            debug!("No chunk after {} for job {}", self.active_index, self.job_id);
            return false;
        }
        if let Some(playback) = &self.playback {
            playback.seek(0.0);
        }
        true
    }

    /// Открыть запомненный чанк и перемотать на запомненную позицию
    pub fn resume_point(&mut self) -> Option<ResumePoint> {
        let items: Vec<MediaItem> = self
            .chunks
            .iter()
            .map(|chunk| chunk_media_item(chunk, self.media_type, self.toggles))
            .collect();
        let point = self.memory.resolve(&self.job_id, self.media_type, &items)?;

        self.open_chunk(point.index);
        if let Some(playback) = &self.playback {
            playback.seek(point.position);
        }
        Some(point)
    }

    /// Шаг синхронизации по времени плеера
    pub fn on_time_update(&mut self, time: f64, playing: bool) -> ViewModel {
        self.is_playing = playing;
        self.hydrate_from_cache();

        let Some(chunk) = self.chunks.get(self.active_index) else {
            return ViewModel::default();
        };
        let key = chunk.key();
        let view = self.resolver.update(SyncInput {
            chunk_key: &key,
            sentences: &chunk.sentences,
            time,
            is_playing: playing,
            visibility: self.visibility,
        });

        let item = chunk_media_item(chunk, self.media_type, self.toggles);
        self.memory.remember(&self.job_id, self.media_type, &item, view.time);

        self.schedule_prefetch(view.active_sentence.unwrap_or(0));
        view
    }

    /// Нормализованное событие плеера. Возвращает новую view-model для `TimeUpdate`.
    pub fn on_playback_event(&mut self, event: &PlaybackEvent) -> Option<ViewModel> {
        match event {
            PlaybackEvent::TimeUpdate(time) => Some(self.on_time_update(*time, self.is_playing)),
            PlaybackEvent::Playing => {
                self.is_playing = true;
                None
            }
            PlaybackEvent::Paused => {
                self.is_playing = false;
                None
            }
            PlaybackEvent::Ended => {
                self.is_playing = false;
                self.advance_chunk();
                None
            }
            PlaybackEvent::AdvanceRequested => {
                self.advance_chunk();
                None
            }
            PlaybackEvent::RateChanged(_) | PlaybackEvent::DurationChanged(_) => None,
        }
    }

    pub fn handle_key(&mut self, key: NavKey, shift: bool) -> KeyOutcome {
        match self.chunks.get(self.active_index) {
            Some(chunk) => self.resolver.handle_key(key, shift, &chunk.sentences),
            None => KeyOutcome::default(),
        }
    }

    /// Клик по токену. Клик в другом предложении перематывает к его началу.
    pub fn select_token(&mut self, selection: TokenSelection) -> bool {
        let Some(chunk) = self.chunks.get(self.active_index) else {
            return false;
        };
        if self.resolver.select_token(selection, &chunk.sentences) {
            return true;
        }

        let start = chunk
            .sentences
            .get(selection.sentence_index)
            .and_then(|sentence| sentence.start_time);
        if let (Some(start), Some(playback)) = (start, &self.playback) {
            debug!(
                "Token in sentence {} clicked, seeking to {:.2}s",
                selection.sentence_index, start
            );
            playback.seek(start);
        }
        false
    }

    /// Дождаться фонового прохода префетча и подхватить загруженные предложения
    pub async fn wait_for_prefetch(&mut self) -> Option<PrefetchReport> {
        let pending = self.pending_prefetch.take()?;
        let report = match pending.await {
            Ok(report) => report,
            Err(e) => {
                debug!("Prefetch task for job {} did not finish: {}", self.job_id, e);
                PrefetchReport::default()
            }
        };
        self.hydrate_from_cache();
        Some(report)
    }

    /// Сохранить память позиции
    pub fn persist(&self) -> ReaderResult<()> {
        self.memory.save()
    }

    fn hydrate_from_cache(&mut self) -> usize {
        let Some(prefetcher) = &self.prefetcher else {
            return 0;
        };
        let mut hydrated = 0;
        for chunk in self.chunks.iter_mut().filter(|c| !c.has_sentences()) {
            if let Some(sentences) = prefetcher.cached_sentences(&chunk.key()) {
                if chunk.hydrate(&sentences) {
                    hydrated += 1;
                }
            }
        }
        hydrated
    }

    fn schedule_prefetch(&mut self, sentence_index: usize) {
        let Some(prefetcher) = &self.prefetcher else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, prefetch pass skipped");
            return;
        };

        let ctx = PrefetchContext {
            chunks: &self.chunks,
            active_index: self.active_index,
            sentence_index,
            toggles: self.toggles,
        };
        let Some(plan) = prefetcher.plan(&ctx) else {
            return;
        };
        if plan.is_empty() {
            return;
        }

        let prefetcher = Arc::clone(prefetcher);
        self.pending_prefetch = Some(runtime.spawn(async move { prefetcher.execute(plan).await }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::cache::SystemClock;
    use crate::config::PrefetchConfig;
    use crate::error::{ReaderError, ReaderResult};
    use crate::models::{AudioTrack, AudioTracks, SentenceMetadata, VariantTokens};
    use crate::playback::{HeadlessMediaElement, PlaybackAdapter};
    use crate::preferences::MemoryPreferences;
    use crate::prefetch::PrefetchTransport;
    use crate::storage_url::StorageUrlResolver;

    #[derive(Default)]
    struct StaticTransport {
        payloads: Mutex<HashMap<String, Vec<SentenceMetadata>>>,
        probes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PrefetchTransport for StaticTransport {
        async fn fetch_sentences(
            &self,
            url: &str,
            _timeout: Duration,
        ) -> ReaderResult<Vec<SentenceMetadata>> {
            self.payloads
                .lock()
                .get(url)
                .cloned()
                .ok_or_else(|| ReaderError::Api {
                    status: 404,
                    message: url.to_string(),
                })
        }

        async fn probe(&self, url: &str, _range: &str, _timeout: Duration) -> ReaderResult<()> {
            self.probes.lock().push(url.to_string());
            Ok(())
        }
    }

    fn sentence(number: usize, start: f64, words: &[&str]) -> SentenceMetadata {
        SentenceMetadata {
            sentence_number: number,
            original: VariantTokens::new(words),
            transliteration: VariantTokens::default(),
            translation: VariantTokens::new(words),
            start_time: Some(start),
            end_time: Some(start + 2.0),
        }
    }

    fn chunks() -> Vec<MediaChunk> {
        vec![
            MediaChunk {
                chunk_id: Some("c1".into()),
                start_sentence: Some(1),
                end_sentence: Some(2),
                sentences: vec![sentence(1, 0.0, &["uno", "dos"]), sentence(2, 2.0, &["tres"])],
                audio_tracks: AudioTracks {
                    translation: Some(AudioTrack::from_path("c1.mp3")),
                    ..Default::default()
                },
                ..Default::default()
            },
            MediaChunk {
                chunk_id: Some("c2".into()),
                start_sentence: Some(3),
                end_sentence: Some(4),
                metadata_path: Some("c2.json".into()),
                audio_tracks: AudioTracks {
                    translation: Some(AudioTrack::from_path("c2.mp3")),
                    ..Default::default()
                },
                ..Default::default()
            },
        ]
    }

    fn prefetcher(transport: Arc<StaticTransport>, mode: PlaybackMode) -> Arc<ChunkPrefetcher> {
        let resolver = StorageUrlResolver::new("http://reader.test", None, "access_token").unwrap();
        Arc::new(ChunkPrefetcher::new(
            transport,
            resolver,
            PrefetchConfig::default(),
            Arc::new(SystemClock),
            mode,
        ))
    }

    fn memory() -> MediaMemoryStore {
        MediaMemoryStore::new(Arc::new(MemoryPreferences::new()))
    }

    #[tokio::test]
    async fn time_update_prefetches_and_hydrates_next_chunk() {
        let transport = Arc::new(StaticTransport::default());
        transport.payloads.lock().insert(
            "http://reader.test/c2.json".into(),
            vec![sentence(3, 0.0, &["cuatro"]), sentence(4, 2.0, &["cinco"])],
        );
        let mut viewer = InteractiveViewer::new("job-1", MediaType::Audio, chunks(), memory())
            .with_prefetcher(prefetcher(transport.clone(), PlaybackMode::Online));

        let view = viewer.on_time_update(0.5, true);
        assert_eq!(view.active_sentence, Some(0));

        let report = viewer.wait_for_prefetch().await.unwrap();
        assert_eq!(report.metadata_loaded, 1);
        assert_eq!(report.audio_warmed, 2);
        assert_eq!(viewer.chunks()[1].sentences.len(), 2);

        // То же предложение: нового прохода нет
        viewer.on_time_update(0.9, true);
        assert!(viewer.wait_for_prefetch().await.is_none());
        assert_eq!(transport.probes.lock().len(), 2);
    }

    #[tokio::test]
    async fn offline_viewer_never_prefetches() {
        let transport = Arc::new(StaticTransport::default());
        let mut viewer = InteractiveViewer::new("job-1", MediaType::Audio, chunks(), memory())
            .with_prefetcher(prefetcher(transport.clone(), PlaybackMode::Offline));

        viewer.on_time_update(0.5, true);
        assert!(viewer.wait_for_prefetch().await.is_none());
        assert!(transport.probes.lock().is_empty());
    }

    #[test]
    fn position_is_remembered_and_resumed() {
        let prefs = Arc::new(MemoryPreferences::new());
        let mut viewer = InteractiveViewer::new(
            "job-123",
            MediaType::Audio,
            chunks(),
            MediaMemoryStore::new(prefs.clone()),
        );
        assert!(viewer.open_chunk(1));
        viewer.on_time_update(42.5, false);

        let mut reopened = InteractiveViewer::new(
            "job-123",
            MediaType::Audio,
            chunks(),
            MediaMemoryStore::new(prefs),
        );
        let point = reopened.resume_point().unwrap();
        assert_eq!(point, ResumePoint { index: 1, position: 42.5 });
        assert_eq!(reopened.active_index(), 1);
    }

    #[test]
    fn ended_advances_to_next_chunk() {
        let mut viewer = InteractiveViewer::new("job", MediaType::Audio, chunks(), memory());
        viewer.on_playback_event(&PlaybackEvent::Playing);
        viewer.on_time_update(1.0, true);

        assert!(viewer.on_playback_event(&PlaybackEvent::Ended).is_none());
        assert_eq!(viewer.active_index(), 1);

        // Последний чанк: дальше идти некуда
        assert!(!viewer.advance_chunk());
        assert_eq!(viewer.active_index(), 1);
    }

    #[test]
    fn keyboard_and_clicks_go_through_resolver() {
        let mut viewer = InteractiveViewer::new("job", MediaType::Audio, chunks(), memory());
        viewer.on_time_update(0.1, false);

        assert!(viewer.select_token(TokenSelection::new(0, VariantKind::Original, 1)));
        let outcome = viewer.handle_key(NavKey::Enter, false);
        assert!(outcome.handled);
        assert_eq!(outcome.lookup.unwrap().text, "dos");

        // Клик во втором предложении не выделяет токен
        assert!(!viewer.select_token(TokenSelection::new(1, VariantKind::Original, 0)));
    }

    #[tokio::test]
    async fn click_in_other_sentence_seeks_player() {
        let element = Arc::new(HeadlessMediaElement::new(Some(10.0)));
        let adapter = PlaybackAdapter::new(element);
        let mut viewer = InteractiveViewer::new("job", MediaType::Audio, chunks(), memory())
            .with_playback(adapter.handle());
        viewer.on_time_update(0.1, false);

        assert!(!viewer.select_token(TokenSelection::new(1, VariantKind::Translation, 0)));
        assert_eq!(adapter.current_time(), 2.0);
    }

    #[test]
    fn hidden_variant_is_left_out_of_view() {
        let mut viewer = InteractiveViewer::new("job", MediaType::Audio, chunks(), memory());
        viewer.set_visibility(VariantKind::Original, false);
        let view = viewer.on_time_update(0.1, true);
        let sentence = view.sentence.unwrap();
        assert!(sentence.variant(VariantKind::Original).is_none());
        assert!(sentence.variant(VariantKind::Translation).is_some());
    }

    #[test]
    fn replacing_chunks_keeps_active_chunk_and_sentences() {
        let mut viewer = InteractiveViewer::new("job", MediaType::Audio, chunks(), memory());
        viewer.open_chunk(1);

        let mut fresh = chunks();
        fresh[0].sentences.clear();
        fresh.insert(
            0,
            MediaChunk {
                chunk_id: Some("c0".into()),
                ..Default::default()
            },
        );
        viewer.replace_chunks(fresh);

        assert_eq!(viewer.active_chunk().unwrap().key(), "c2");
        assert_eq!(viewer.chunks()[1].sentences.len(), 2);
    }

    /// Чанки, у которых есть только подписанные URL
    fn signed_chunks(token: &str) -> Vec<MediaChunk> {
        let signed = |name: &str| {
            format!("https://reader.test/jobs/j/{}?access_token={}", name, token)
        };
        vec![
            MediaChunk {
                start_sentence: Some(1),
                end_sentence: Some(2),
                metadata_url: Some(signed("meta_1.json")),
                sentences: vec![sentence(1, 0.0, &["uno", "dos"]), sentence(2, 2.0, &["tres"])],
                audio_tracks: AudioTracks {
                    translation: Some(AudioTrack::from_url(signed("audio_1.mp3"))),
                    ..Default::default()
                },
                ..Default::default()
            },
            MediaChunk {
                start_sentence: Some(3),
                end_sentence: Some(4),
                metadata_url: Some(signed("meta_2.json")),
                audio_tracks: AudioTracks {
                    translation: Some(AudioTrack::from_url(signed("audio_2.mp3"))),
                    ..Default::default()
                },
                ..Default::default()
            },
        ]
    }

    #[test]
    fn resume_survives_token_rotation() {
        let prefs = Arc::new(MemoryPreferences::new());
        let mut viewer = InteractiveViewer::new(
            "job-123",
            MediaType::Audio,
            signed_chunks("a"),
            MediaMemoryStore::new(prefs.clone()),
        );
        assert!(viewer.open_chunk(1));
        viewer.on_time_update(42.5, false);

        let mut reopened = InteractiveViewer::new(
            "job-123",
            MediaType::Audio,
            signed_chunks("b"),
            MediaMemoryStore::new(prefs),
        );
        assert_eq!(
            reopened.resume_point(),
            Some(ResumePoint {
                index: 1,
                position: 42.5,
            })
        );
    }

    #[tokio::test]
    async fn refreshed_tokens_keep_prefetched_sentences() {
        let transport = Arc::new(StaticTransport::default());
        transport.payloads.lock().insert(
            "https://reader.test/jobs/j/meta_2.json?access_token=a".into(),
            vec![sentence(3, 0.0, &["cuatro"]), sentence(4, 2.0, &["cinco"])],
        );
        let prefetcher = prefetcher(transport.clone(), PlaybackMode::Online);
        let mut viewer =
            InteractiveViewer::new("job", MediaType::Audio, signed_chunks("a"), memory())
                .with_prefetcher(prefetcher.clone());

        viewer.on_time_update(0.5, true);
        let report = viewer.wait_for_prefetch().await.unwrap();
        assert_eq!(report.metadata_loaded, 1);
        assert!(transport
            .probes
            .lock()
            .iter()
            .all(|url| url.ends_with("access_token=a")));

        let fresh = signed_chunks("b");
        assert!(prefetcher.cached_sentences(&fresh[1].key()).is_some());

        viewer.open_chunk(1);
        viewer.replace_chunks(fresh);
        assert_eq!(viewer.active_index(), 1);
        assert_eq!(viewer.chunks()[1].sentences.len(), 2);
    }
}
