//! Модуль обработки ошибок
//!
//! Типы ошибок, которые могут возникнуть при синхронизации воспроизведения,
//! загрузке метаданных и работе с настройками.

use thiserror::Error;

/// Ошибки библиотеки interactive-reader
#[derive(Debug, Error)]
pub enum ReaderError {
    /// Ошибка HTTP запроса
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Ошибка ввода-вывода
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ошибка сериализации/десериализации JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Сервер ответил не-2xx статусом
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Запрос не уложился в отведенное время
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Ошибка конфигурации
    #[error("Configuration error: {0}")]
    Config(String),

    /// Невалидные данные формы
    #[error("Validation error: {0}")]
    Validation(String),

    /// Неверный формат полезной нагрузки
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Ошибка медиа-элемента (autoplay, fullscreen, отсутствие поддержки)
    #[error("Media error: {0}")]
    Media(String),

    /// Другая ошибка
    #[error("Other error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ReaderError {
    /// Short text shown inline next to the control that triggered the action.
    pub fn user_message(&self) -> String {
        match self {
            ReaderError::Http(e) if e.is_timeout() => {
                "The server took too long to respond. Please try again.".to_string()
            }
            ReaderError::Http(e) if e.is_connect() => {
                "Unable to reach the server. Check your connection.".to_string()
            }
            ReaderError::Http(_) => "Network request failed.".to_string(),
            ReaderError::Timeout(_) => {
                "The server took too long to respond. Please try again.".to_string()
            }
            ReaderError::Api { message, .. } if !message.trim().is_empty() => {
                message.trim().to_string()
            }
            ReaderError::Api { status, .. } => format!("Request failed with status {}.", status),
            ReaderError::Validation(message) => message.clone(),
            ReaderError::Config(message) => format!("Invalid configuration: {}", message),
            ReaderError::InvalidFormat(_) | ReaderError::Json(_) => {
                "The server returned an unexpected response.".to_string()
            }
            ReaderError::Media(message) => format!("Playback failed: {}", message),
            ReaderError::Io(e) => format!("File operation failed: {}", e),
            ReaderError::Other(message) => message.clone(),
            ReaderError::Anyhow(e) => e.to_string(),
        }
    }
}

impl From<&str> for ReaderError {
    fn from(s: &str) -> Self {
        ReaderError::Other(s.to_string())
    }
}

impl From<String> for ReaderError {
    fn from(s: String) -> Self {
        ReaderError::Other(s)
    }
}

/// Тип Result для библиотеки
pub type ReaderResult<T> = std::result::Result<T, ReaderError>;
