//! # Пользовательские настройки
//!
//! Единый порт для всего, что раньше лежало в локальном хранилище браузера:
//! свернутый заголовок, последний язык, модель LLM, системный промпт и
//! память медиа по заданиям. Значения хранятся как JSON; поврежденное
//! значение считается отсутствующим.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{info, warn};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ReaderResult;
use crate::models::MediaType;

/// Фиксированные ключи настроек
pub mod keys {
    use crate::models::MediaType;

    pub const HEADER_COLLAPSED: &str = "reader.header-collapsed";
    pub const LAST_LANGUAGE: &str = "reader.last-language";
    pub const LAST_LLM_MODEL: &str = "reader.last-llm-model";
    pub const SYSTEM_PROMPT: &str = "reader.system-prompt";

    const MEDIA_MEMORY_PREFIX: &str = "reader.media-memory";

    /// Ключ памяти медиа для задания и типа медиа
    pub fn media_memory(job_id: &str, media_type: MediaType) -> String {
        format!("{}.{}.{}", MEDIA_MEMORY_PREFIX, job_id, media_type.as_str())
    }
}

/// Хранилище ключ-значение
pub trait Preferences: Send + Sync {
    fn get_raw(&self, key: &str) -> Option<Value>;
    fn set_raw(&self, key: &str, value: Value);
    fn remove(&self, key: &str);

    /// Сбросить накопленные изменения на диск
    fn save(&self) -> ReaderResult<()> {
        Ok(())
    }
}

/// Типизированный доступ поверх [`Preferences`]
pub trait PreferencesExt {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T>;
    fn set<T: Serialize>(&self, key: &str, value: &T);
}

impl<P: Preferences + ?Sized> PreferencesExt for P {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_raw(key)?;
        match serde_json::from_value(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring corrupt preference {}: {}", key, e);
                None
            }
        }
    }

    fn set<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(raw) => self.set_raw(key, raw),
            Err(e) => warn!("Cannot serialize preference {}: {}", key, e),
        }
    }
}

/// Настройки только в памяти
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Preferences for MemoryPreferences {
    fn get_raw(&self, key: &str) -> Option<Value> {
        self.values.lock().get(key).cloned()
    }

    fn set_raw(&self, key: &str, value: Value) {
        self.values.lock().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.values.lock().remove(key);
    }
}

struct FileState {
    values: BTreeMap<String, Value>,
    dirty: bool,
}

/// Настройки в одном JSON файле (аналог `.settings.dat`)
pub struct JsonFilePreferences {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl JsonFilePreferences {
    /// Открыть файл настроек. Отсутствующий или поврежденный файл дает пустые настройки.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, Value>>(&content) {
                Ok(values) => values,
                Err(e) => {
                    warn!(
                        "Preferences file {} is corrupt, starting empty: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("Cannot read preferences {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };

        Self {
            path,
            state: Mutex::new(FileState {
                values,
                dirty: false,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Preferences for JsonFilePreferences {
    fn get_raw(&self, key: &str) -> Option<Value> {
        self.state.lock().values.get(key).cloned()
    }

    fn set_raw(&self, key: &str, value: Value) {
        let mut state = self.state.lock();
        if state.values.get(key) != Some(&value) {
            state.values.insert(key.to_string(), value);
            state.dirty = true;
        }
    }

    fn remove(&self, key: &str) {
        let mut state = self.state.lock();
        if state.values.remove(key).is_some() {
            state.dirty = true;
        }
    }

    fn save(&self) -> ReaderResult<()> {
        let mut state = self.state.lock();
        if !state.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Cannot create preferences directory {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(&state.values)?;
        // Пишем во временный файл и переименовываем, чтобы не оставить обрезанный JSON
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("Cannot write preferences {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Cannot replace preferences {}", self.path.display()))?;
        state.dirty = false;
        info!("Preferences saved to {}", self.path.display());
        Ok(())
    }
}

/// Типизированные UI-настройки
pub struct UiPreferences<'a> {
    store: &'a dyn Preferences,
}

impl<'a> UiPreferences<'a> {
    pub fn new(store: &'a dyn Preferences) -> Self {
        Self { store }
    }

    pub fn header_collapsed(&self) -> bool {
        self.store.get(keys::HEADER_COLLAPSED).unwrap_or(false)
    }

    pub fn set_header_collapsed(&self, collapsed: bool) {
        self.store.set(keys::HEADER_COLLAPSED, &collapsed);
    }

    pub fn last_language(&self) -> Option<String> {
        self.non_empty(keys::LAST_LANGUAGE)
    }

    pub fn set_last_language(&self, language: &str) {
        self.set_or_clear(keys::LAST_LANGUAGE, language);
    }

    pub fn last_llm_model(&self) -> Option<String> {
        self.non_empty(keys::LAST_LLM_MODEL)
    }

    pub fn set_last_llm_model(&self, model: &str) {
        self.set_or_clear(keys::LAST_LLM_MODEL, model);
    }

    pub fn system_prompt(&self) -> Option<String> {
        self.non_empty(keys::SYSTEM_PROMPT)
    }

    pub fn set_system_prompt(&self, prompt: &str) {
        self.set_or_clear(keys::SYSTEM_PROMPT, prompt);
    }

    /// Забыть всю память медиа для задания
    pub fn forget_job(&self, job_id: &str) {
        for media_type in [MediaType::Text, MediaType::Audio, MediaType::Video] {
            self.store.remove(&keys::media_memory(job_id, media_type));
        }
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        self.store
            .get::<String>(key)
            .filter(|v| !v.trim().is_empty())
    }

    fn set_or_clear(&self, key: &str, value: &str) {
        if value.trim().is_empty() {
            self.store.remove(key);
        } else {
            self.store.set(key, &value.trim());
        }
    }
}
