//! Преобразование относительных путей хранилища в URL с токеном доступа.

use reqwest::Url;

use crate::config::ReaderConfig;
use crate::error::{ReaderError, ReaderResult};

const PASSTHROUGH_PREFIXES: [&str; 4] = ["data:", "blob:", "http://", "https://"];

#[derive(Debug, Clone)]
pub struct StorageUrlResolver {
    base: Url,
    token: Option<String>,
    token_param: String,
}

impl StorageUrlResolver {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        token_param: impl Into<String>,
    ) -> ReaderResult<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| ReaderError::Config(format!("invalid api_base_url {}: {}", base_url, e)))?;

        Ok(Self {
            base,
            token: token.filter(|t| !t.trim().is_empty()),
            token_param: token_param.into(),
        })
    }

    pub fn from_config(config: &ReaderConfig) -> ReaderResult<Self> {
        Self::new(
            &config.api_base_url,
            config.access_token.clone(),
            config.access_token_param.clone(),
        )
    }

    /// Сменить токен (например, после обновления сессии)
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token.filter(|t| !t.trim().is_empty());
    }

    /// Абсолютный URL для пути хранилища.
    ///
    /// `data:`, `blob:` и абсолютные URL возвращаются без изменений.
    /// Токен добавляется только к адресам того же origin, что и база.
    pub fn resolve(&self, path: &str) -> Option<String> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }

        let lowered = path.to_ascii_lowercase();
        if PASSTHROUGH_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
            return Some(path.to_string());
        }

        let mut url = match self.base.join(path) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Cannot resolve storage path {}: {}", path, e);
                return None;
            }
        };

        if url.origin() != self.base.origin() {
            log::debug!("Storage path {} points to another origin, token not attached", path);
            return Some(url.to_string());
        }

        if let Some(token) = &self.token {
            let already_present = url.query_pairs().any(|(k, _)| k == self.token_param.as_str());
            if !already_present {
                url.query_pairs_mut().append_pair(&self.token_param, token);
            }
        }

        Some(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StorageUrlResolver {
        StorageUrlResolver::new("https://reader.example/api", Some("t0k".into()), "access_token")
            .unwrap()
    }

    #[test]
    fn relative_path_gets_base_and_token() {
        let url = resolver().resolve("storage/jobs/j1/chunk_1.mp3").unwrap();
        assert_eq!(
            url,
            "https://reader.example/api/storage/jobs/j1/chunk_1.mp3?access_token=t0k"
        );
    }

    #[test]
    fn existing_query_is_kept() {
        let url = resolver().resolve("storage/a.json?v=2").unwrap();
        assert_eq!(url, "https://reader.example/api/storage/a.json?v=2&access_token=t0k");

        let url = resolver().resolve("storage/a.json?access_token=other").unwrap();
        assert_eq!(url, "https://reader.example/api/storage/a.json?access_token=other");
    }

    #[test]
    fn absolute_and_inline_urls_pass_through() {
        let r = resolver();
        assert_eq!(r.resolve("data:audio/mp3;base64,AAAA").unwrap(), "data:audio/mp3;base64,AAAA");
        assert_eq!(r.resolve("blob:https://x/123").unwrap(), "blob:https://x/123");
        assert_eq!(r.resolve("https://cdn.example/a.mp3").unwrap(), "https://cdn.example/a.mp3");
        assert!(r.resolve("   ").is_none());
    }

    #[test]
    fn protocol_relative_reference_never_gets_token() {
        let r = resolver();
        assert_eq!(
            r.resolve("//cdn.other.example/a.mp3").unwrap(),
            "https://cdn.other.example/a.mp3"
        );
        assert_eq!(
            r.resolve("//reader.example/storage/a.mp3").unwrap(),
            "https://reader.example/storage/a.mp3?access_token=t0k"
        );
    }

    #[test]
    fn no_token_means_no_query() {
        let r = StorageUrlResolver::new("http://localhost:8000/", None, "access_token").unwrap();
        assert_eq!(r.resolve("/storage/a.mp3").unwrap(), "http://localhost:8000/storage/a.mp3");
    }
}
