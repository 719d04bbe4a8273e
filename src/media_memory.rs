//! # Память медиа
//!
//! Для каждого задания и типа медиа помнит последний выбранный элемент и
//! позицию воспроизведения, чтобы вернувшийся пользователь продолжил с того
//! же места. Элементы сопоставляются по "базовому id", который не зависит
//! от подписанного URL с ротируемым токеном.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::models::{strip_query, MediaItem, MediaType};
use crate::preferences::{keys, Preferences, PreferencesExt};

/// Запомненная позиция
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackMemory {
    pub media_id: String,
    pub position: f64,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Откуда продолжить воспроизведение
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResumePoint {
    /// Индекс элемента в текущем медиа-списке
    pub index: usize,
    pub position: f64,
}

/// Стабильный идентификатор медиа-элемента
pub fn base_id(item: &MediaItem) -> String {
    let non_empty = |value: &Option<String>| -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    non_empty(&item.id)
        .or_else(|| non_empty(&item.chunk_id))
        .or_else(|| non_empty(&item.path).map(|p| strip_query(&p).to_string()))
        .or_else(|| non_empty(&item.url).map(|u| strip_query(&u).to_string()))
        .unwrap_or_else(|| item.name.trim().to_string())
}

pub struct MediaMemoryStore {
    prefs: Arc<dyn Preferences>,
}

impl MediaMemoryStore {
    pub fn new(prefs: Arc<dyn Preferences>) -> Self {
        Self { prefs }
    }

    /// Запомнить позицию; по ключу хранится только последнее значение
    pub fn remember(&self, job_id: &str, media_type: MediaType, item: &MediaItem, position: f64) {
        let position = if position.is_finite() { position.max(0.0) } else { 0.0 };
        let memory = PlaybackMemory {
            media_id: base_id(item),
            position,
            updated_at: Some(Utc::now()),
        };
        self.prefs
            .set(&keys::media_memory(job_id, media_type), &memory);
    }

    pub fn recall(&self, job_id: &str, media_type: MediaType) -> Option<PlaybackMemory> {
        self.prefs.get(&keys::media_memory(job_id, media_type))
    }

    pub fn forget(&self, job_id: &str, media_type: MediaType) {
        self.prefs.remove(&keys::media_memory(job_id, media_type));
    }

    /// Куда вернуться при открытии: запомненный элемент, если он есть в списке,
    /// иначе первый элемент с позиции 0.
    pub fn resolve(
        &self,
        job_id: &str,
        media_type: MediaType,
        items: &[MediaItem],
    ) -> Option<ResumePoint> {
        if items.is_empty() {
            return None;
        }

        if let Some(memory) = self.recall(job_id, media_type) {
            if let Some(index) = items.iter().position(|item| base_id(item) == memory.media_id) {
                debug!(
                    "Resuming {} at {:.1}s for job {}",
                    memory.media_id, memory.position, job_id
                );
                return Some(ResumePoint {
                    index,
                    position: memory.position,
                });
            }
            debug!(
                "Remembered media {} is no longer listed for job {}",
                memory.media_id, job_id
            );
        }

        Some(ResumePoint {
            index: 0,
            position: 0.0,
        })
    }

    pub fn save(&self) -> crate::error::ReaderResult<()> {
        self.prefs.save()
    }
}
