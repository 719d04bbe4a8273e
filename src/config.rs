//! Модуль конфигурации
//!
//! Структуры для настройки резолвера URL, префетчера и хранилища настроек.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, ReaderResult};

/// Режим воспроизведения
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Медиа отдается сервером, префетч разрешен
    Online,
    /// Экспортированный/офлайн плеер, префетч отключен
    Offline,
}

impl Default for PlaybackMode {
    fn default() -> Self {
        Self::Online
    }
}

/// Настройки префетча соседних чанков
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Сколько предложений вперед/назад держать "теплыми"
    pub radius: usize,
    /// Таймаут загрузки метаданных, мс
    pub metadata_timeout_ms: u64,
    /// Минимальный интервал между повторами загрузки метаданных, мс
    pub metadata_retry_ms: u64,
    /// Минимальный интервал между повторами пробы аудио, мс
    pub audio_retry_ms: u64,
    /// Последний байт пробного Range-запроса (включительно)
    pub probe_range_end: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            radius: 2,
            metadata_timeout_ms: 4_000,
            metadata_retry_ms: 6_000,
            audio_retry_ms: 12_000,
            probe_range_end: 2047,
        }
    }
}

impl PrefetchConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn metadata_retry_interval(&self) -> Duration {
        Duration::from_millis(self.metadata_retry_ms)
    }

    pub fn audio_retry_interval(&self) -> Duration {
        Duration::from_millis(self.audio_retry_ms)
    }

    /// Значение заголовка `Range` для пробы аудио
    pub fn probe_range_header(&self) -> String {
        format!("bytes=0-{}", self.probe_range_end)
    }
}

/// Конфигурация библиотеки
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReaderConfig {
    /// Базовый URL backend-а, к нему достраиваются относительные пути хранилища
    pub api_base_url: String,
    /// Токен доступа, добавляется к URL ассетов как query-параметр
    pub access_token: Option<String>,
    /// Имя query-параметра для токена
    pub access_token_param: String,
    pub playback_mode: PlaybackMode,
    pub prefetch: PrefetchConfig,
    /// Файл с пользовательскими настройками (None = только в памяти)
    pub preferences_path: Option<PathBuf>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            access_token: None,
            access_token_param: "access_token".to_string(),
            playback_mode: PlaybackMode::default(),
            prefetch: PrefetchConfig::default(),
            preferences_path: None,
        }
    }
}

impl ReaderConfig {
    /// Загрузить конфигурацию из JSON файла; отсутствующие поля берутся по умолчанию
    pub fn from_file(path: impl AsRef<Path>) -> ReaderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReaderError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: ReaderConfig = serde_json::from_str(&content)?;
        config.validate()?;
        log::info!("Loaded reader configuration from {}", path.display());
        Ok(config)
    }

    /// Переопределить адрес backend-а и токен из переменных окружения
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base) = std::env::var("READER_API_BASE_URL") {
            if !base.trim().is_empty() {
                self.api_base_url = base.trim().to_string();
            }
        }
        if let Ok(token) = std::env::var("READER_ACCESS_TOKEN") {
            let token = token.trim();
            self.access_token = if token.is_empty() {
                None
            } else {
                Some(token.to_string())
            };
        }
        self
    }

    pub fn validate(&self) -> ReaderResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(ReaderError::Config("api_base_url must not be empty".into()));
        }
        if self.access_token_param.trim().is_empty() {
            return Err(ReaderError::Config(
                "access_token_param must not be empty".into(),
            ));
        }
        if self.prefetch.radius == 0 {
            return Err(ReaderError::Config("prefetch radius must be at least 1".into()));
        }
        if self.prefetch.metadata_timeout_ms == 0 {
            return Err(ReaderError::Config("metadata timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_prefetch_contract() {
        let config = ReaderConfig::default();
        assert_eq!(config.prefetch.radius, 2);
        assert_eq!(config.prefetch.metadata_timeout(), Duration::from_secs(4));
        assert_eq!(config.prefetch.metadata_retry_interval(), Duration::from_secs(6));
        assert_eq!(config.prefetch.audio_retry_interval(), Duration::from_secs(12));
        assert_eq!(config.prefetch.probe_range_header(), "bytes=0-2047");
        assert_eq!(config.playback_mode, PlaybackMode::Online);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"api_base_url": "https://reader.example", "playback_mode": "offline", "prefetch": {{"radius": 3}}}}"#
        )
        .unwrap();

        let config = ReaderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api_base_url, "https://reader.example");
        assert_eq!(config.playback_mode, PlaybackMode::Offline);
        assert_eq!(config.prefetch.radius, 3);
        assert_eq!(config.prefetch.metadata_retry_ms, 6_000);
        assert_eq!(config.access_token_param, "access_token");
    }

    #[test]
    fn zero_radius_is_rejected() {
        let mut config = ReaderConfig::default();
        config.prefetch.radius = 0;
        assert!(matches!(config.validate(), Err(ReaderError::Config(_))));
    }
}
