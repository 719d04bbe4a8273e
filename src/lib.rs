//! # interactive-reader
//!
//! Ядро интерактивного чтения озвученной книги: префетч соседних чанков,
//! пословная синхронизация текста с аудио, ручное выделение и навигация,
//! адаптер воспроизведения и память позиции по заданиям.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod logger;
pub mod media_memory;
pub mod models;
pub mod pipeline;
pub mod playback;
pub mod preferences;
pub mod prefetch;
pub mod render;
pub mod storage_url;
pub mod sync;
pub mod viewer;

pub use api::BackendClient;
pub use config::{PlaybackMode, PrefetchConfig, ReaderConfig};
pub use error::{ReaderError, ReaderResult};
pub use media_memory::{MediaMemoryStore, ResumePoint};
pub use models::{
    AudioToggles, CueVisibility, MediaChunk, MediaItem, MediaType, SentenceMetadata,
    TokenSelection, VariantKind,
};
pub use pipeline::PipelineRequest;
pub use playback::{PlaybackAdapter, PlaybackEvent, PlaybackHandle};
pub use preferences::{JsonFilePreferences, MemoryPreferences, Preferences, UiPreferences};
pub use prefetch::{ChunkPrefetcher, HttpTransport, PrefetchTransport};
pub use storage_url::StorageUrlResolver;
pub use sync::{SyncResolver, ViewModel};
pub use viewer::InteractiveViewer;
