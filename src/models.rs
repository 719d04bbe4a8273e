//! # Модели данных
//!
//! Чанки сгенерированного вывода, метаданные предложений, аудиодорожки,
//! элементы медиа-списка и типы выделения токенов.

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, ReaderResult};

/// Текстовый слой предложения
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    Original,
    Translit,
    Translation,
}

impl VariantKind {
    /// Порядок отображения слоев (и навигации Up/Down)
    pub const DISPLAY_ORDER: [VariantKind; 3] = [
        VariantKind::Original,
        VariantKind::Translit,
        VariantKind::Translation,
    ];

    /// Приоритет слоев при выборе подсветки по таймингу
    pub const DEFAULT_PREFERENCE: [VariantKind; 3] = [
        VariantKind::Translation,
        VariantKind::Translit,
        VariantKind::Original,
    ];

    /// Параллельный слой для "теневой" подсветки
    pub fn opposite(self) -> Option<VariantKind> {
        match self {
            VariantKind::Translit => Some(VariantKind::Translation),
            VariantKind::Translation => Some(VariantKind::Translit),
            VariantKind::Original => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariantKind::Original => "original",
            VariantKind::Translit => "translit",
            VariantKind::Translation => "translation",
        }
    }
}

/// Токены одного слоя предложения
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantTokens {
    pub text: String,
    pub tokens: Vec<String>,
    /// Время начала каждого токена относительно начала аудио чанка, сек
    #[serde(alias = "token_times", skip_serializing_if = "Option::is_none")]
    pub token_times: Option<Vec<f64>>,
}

impl VariantTokens {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            text: tokens.join(" "),
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            token_times: None,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Метаданные одного предложения. После загрузки не меняются.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SentenceMetadata {
    #[serde(alias = "sentence_number")]
    pub sentence_number: usize,
    pub original: VariantTokens,
    #[serde(alias = "translit")]
    pub transliteration: VariantTokens,
    pub translation: VariantTokens,
    #[serde(alias = "start_time", skip_serializing_if = "Option::is_none")]
    pub start_time: Option<f64>,
    #[serde(alias = "end_time", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<f64>,
}

impl SentenceMetadata {
    pub fn variant(&self, kind: VariantKind) -> &VariantTokens {
        match kind {
            VariantKind::Original => &self.original,
            VariantKind::Translit => &self.transliteration,
            VariantKind::Translation => &self.translation,
        }
    }

    pub fn token_count(&self, kind: VariantKind) -> usize {
        self.variant(kind).len()
    }

    /// Окно [start, end) предложения на шкале аудио, если тайминг известен
    pub fn time_window(&self) -> Option<(f64, f64)> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) if start.is_finite() && end.is_finite() && end > start => {
                Some((start, end))
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SentencePayload {
    List(Vec<SentenceMetadata>),
    Envelope { sentences: Vec<SentenceMetadata> },
}

/// Разобрать ответ с метаданными чанка: массив предложений или `{ "sentences": [...] }`
pub fn parse_sentence_payload(bytes: &[u8]) -> ReaderResult<Vec<SentenceMetadata>> {
    match serde_json::from_slice::<SentencePayload>(bytes) {
        Ok(SentencePayload::List(sentences)) => Ok(sentences),
        Ok(SentencePayload::Envelope { sentences }) => Ok(sentences),
        Err(e) => Err(ReaderError::InvalidFormat(format!(
            "chunk metadata is neither a sentence list nor an envelope: {}",
            e
        ))),
    }
}

/// Ссылка на аудиофайл: абсолютный URL или путь в хранилище
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTrack {
    pub url: Option<String>,
    pub path: Option<String>,
}

impl AudioTrack {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            path: None,
        }
    }

    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            url: None,
            path: Some(path.into()),
        }
    }

    /// URL, если он есть, иначе путь хранилища
    pub fn location(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.path.as_deref().filter(|p| !p.trim().is_empty()))
    }
}

/// Какие дорожки включены пользователем
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioToggles {
    pub original: bool,
    pub translation: bool,
}

impl Default for AudioToggles {
    fn default() -> Self {
        Self {
            original: false,
            translation: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioTracks {
    #[serde(alias = "orig")]
    pub original: Option<AudioTrack>,
    pub translation: Option<AudioTrack>,
    #[serde(alias = "orig_trans")]
    pub combined: Option<AudioTrack>,
}

impl AudioTracks {
    /// Выбрать дорожку под текущие переключатели
    pub fn select(&self, toggles: AudioToggles) -> Option<&AudioTrack> {
        fn usable(track: &Option<AudioTrack>) -> Option<&AudioTrack> {
            track.as_ref().filter(|t| t.location().is_some())
        }

        if toggles.original && toggles.translation {
            if let Some(track) = usable(&self.combined) {
                return Some(track);
            }
        }
        if toggles.translation {
            if let Some(track) = usable(&self.translation) {
                return Some(track);
            }
        }
        if toggles.original {
            if let Some(track) = usable(&self.original) {
                return Some(track);
            }
        }
        None
    }
}

/// Непрерывный диапазон сгенерированных предложений с общим аудио и метаданными
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaChunk {
    #[serde(alias = "chunk_id")]
    pub chunk_id: Option<String>,
    #[serde(alias = "range_fragment")]
    pub range_fragment: Option<String>,
    #[serde(alias = "start_sentence")]
    pub start_sentence: Option<usize>,
    #[serde(alias = "end_sentence")]
    pub end_sentence: Option<usize>,
    #[serde(alias = "sentence_count")]
    pub sentence_count: Option<usize>,
    #[serde(alias = "metadata_url")]
    pub metadata_url: Option<String>,
    #[serde(alias = "metadata_path")]
    pub metadata_path: Option<String>,
    pub sentences: Vec<SentenceMetadata>,
    #[serde(alias = "audio_tracks")]
    pub audio_tracks: AudioTracks,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Адрес без query и fragment
pub fn strip_query(url: &str) -> &str {
    let end = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
    &url[..end]
}

impl MediaChunk {
    /// Стабильный ключ чанка для кэшей.
    ///
    /// Query и fragment путей отбрасываются: подписанный URL меняет токен
    /// при каждом обновлении списка, а ключ меняться не должен.
    pub fn key(&self) -> String {
        let unsigned = |value: &Option<String>| {
            non_empty(value)
                .map(|v| strip_query(&v).to_string())
                .filter(|v| !v.is_empty())
        };

        non_empty(&self.chunk_id)
            .or_else(|| non_empty(&self.range_fragment))
            .or_else(|| unsigned(&self.metadata_path))
            .or_else(|| unsigned(&self.metadata_url))
            .unwrap_or_else(|| {
                format!(
                    "{}-{}",
                    self.start_sentence.unwrap_or(0),
                    self.end_sentence.unwrap_or(0)
                )
            })
    }

    /// Включительный диапазон номеров предложений
    pub fn sentence_range(&self) -> Option<(usize, usize)> {
        let start = self.start_sentence?;
        let end = self
            .end_sentence
            .or_else(|| {
                self.sentence_count
                    .filter(|c| *c > 0)
                    .map(|c| start + c - 1)
            })
            .or_else(|| {
                (!self.sentences.is_empty()).then(|| start + self.sentences.len() - 1)
            })
            .unwrap_or(start);
        Some((start, end.max(start)))
    }

    pub fn contains_sentence(&self, number: usize) -> bool {
        self.sentence_range()
            .map(|(start, end)| start <= number && number <= end)
            .unwrap_or(false)
    }

    /// Источник метаданных: URL или путь хранилища
    pub fn metadata_location(&self) -> Option<String> {
        non_empty(&self.metadata_url).or_else(|| non_empty(&self.metadata_path))
    }

    pub fn has_sentences(&self) -> bool {
        !self.sentences.is_empty()
    }

    /// Заполнить предложения, только если их еще нет. Возвращает true, если записали.
    pub fn hydrate(&mut self, sentences: &[SentenceMetadata]) -> bool {
        if self.has_sentences() || sentences.is_empty() {
            return false;
        }
        self.sentences = sentences.to_vec();
        true
    }

    /// Абсолютный номер предложения по индексу внутри чанка
    pub fn sentence_number_at(&self, index: usize) -> Option<usize> {
        if let Some(sentence) = self.sentences.get(index) {
            if sentence.sentence_number > 0 {
                return Some(sentence.sentence_number);
            }
        }
        self.start_sentence.map(|start| start + index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Text,
    Audio,
    Video,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Text => "text",
            MediaType::Audio => "audio",
            MediaType::Video => "video",
        }
    }
}

/// Элемент медиа-списка задания
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Подписанный URL; токен в нем может меняться между запросами
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(alias = "media_type", alias = "type")]
    pub media_type: MediaType,
    #[serde(default, alias = "chunk_id")]
    pub chunk_id: Option<String>,
}

/// Текущий выделенный токен
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSelection {
    pub sentence_index: usize,
    pub variant: VariantKind,
    pub token_index: usize,
}

impl TokenSelection {
    pub fn new(sentence_index: usize, variant: VariantKind, token_index: usize) -> Self {
        Self {
            sentence_index,
            variant,
            token_index,
        }
    }

    /// Прижать индекс токена к границам слоя; None, если слой пуст
    pub fn clamped(self, token_count: usize) -> Option<Self> {
        if token_count == 0 {
            return None;
        }
        Some(Self {
            token_index: self.token_index.min(token_count - 1),
            ..self
        })
    }
}

/// Выделение нескольких токенов, всегда start <= end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRange {
    pub sentence_index: usize,
    pub variant: VariantKind,
    pub start_index: usize,
    pub end_index: usize,
}

impl TokenRange {
    pub fn new(sentence_index: usize, variant: VariantKind, a: usize, b: usize) -> Self {
        Self {
            sentence_index,
            variant,
            start_index: a.min(b),
            end_index: a.max(b),
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start_index <= index && index <= self.end_index
    }

    pub fn len(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    pub fn is_single(&self) -> bool {
        self.start_index == self.end_index
    }
}

/// Видимость текстовых слоев
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueVisibility {
    pub original: bool,
    pub translit: bool,
    pub translation: bool,
}

impl Default for CueVisibility {
    fn default() -> Self {
        Self {
            original: true,
            translit: true,
            translation: true,
        }
    }
}

impl CueVisibility {
    pub fn is_visible(&self, kind: VariantKind) -> bool {
        match kind {
            VariantKind::Original => self.original,
            VariantKind::Translit => self.translit,
            VariantKind::Translation => self.translation,
        }
    }

    pub fn set(&mut self, kind: VariantKind, visible: bool) {
        match kind {
            VariantKind::Original => self.original = visible,
            VariantKind::Translit => self.translit = visible,
            VariantKind::Translation => self.translation = visible,
        }
    }
}
