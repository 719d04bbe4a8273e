//! # Адаптер воспроизведения
//!
//! Тонкая обертка над нативным медиа-элементом: play/pause/seek/rate,
//! текущее время, длительность и нормализованные события. Любые отказы
//! элемента (autoplay, отсутствие медиа в headless-окружении) логируются и
//! проглатываются: наверх ничего не пробрасывается.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::error::{ReaderError, ReaderResult};

pub const MIN_RATE: f64 = 0.25;
pub const MAX_RATE: f64 = 4.0;
pub const DEFAULT_RATE: f64 = 1.0;

const EVENT_CAPACITY: usize = 64;

/// Скорость воспроизведения в допустимых пределах; 0 и не-числа дают 1
pub fn clamp_rate(rate: f64) -> f64 {
    if !rate.is_finite() || rate == 0.0 {
        return DEFAULT_RATE;
    }
    rate.clamp(MIN_RATE, MAX_RATE)
}

/// Нативный медиа-элемент (audio/video)
#[async_trait]
pub trait MediaElement: Send + Sync {
    async fn play(&self) -> ReaderResult<()>;
    fn pause(&self) -> ReaderResult<()>;
    fn seek(&self, time: f64) -> ReaderResult<()>;
    fn set_rate(&self, rate: f64) -> ReaderResult<()>;
    fn current_time(&self) -> f64;
    fn duration(&self) -> Option<f64>;
    async fn request_fullscreen(&self) -> ReaderResult<()>;
}

/// Нормализованные события воспроизведения
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    TimeUpdate(f64),
    Playing,
    Paused,
    Ended,
    RateChanged(f64),
    DurationChanged(f64),
    /// Родитель попросил перейти к следующему чанку
    AdvanceRequested,
}

struct AdapterInner {
    element: Arc<dyn MediaElement>,
    events: broadcast::Sender<PlaybackEvent>,
    rate: Mutex<f64>,
    playing: AtomicBool,
}

impl AdapterInner {
    fn emit(&self, event: PlaybackEvent) {
        // Нет подписчиков - не ошибка
        let _ = self.events.send(event);
    }
}

/// Хэндл для императивного управления воспроизведением из родительского компонента
#[derive(Clone)]
pub struct PlaybackHandle {
    inner: Arc<AdapterInner>,
}

impl PlaybackHandle {
    /// Запустить воспроизведение, не дожидаясь ответа элемента.
    ///
    /// Запрос уходит задачей на текущий tokio runtime; отказ элемента только
    /// логируется. Вне runtime вызов игнорируется и возвращает `None`.
    pub fn play(&self) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime, play request dropped");
            return None;
        };
        let inner = Arc::clone(&self.inner);
        Some(runtime.spawn(async move {
            if let Err(e) = inner.element.play().await {
                warn!("Playback start rejected: {}", e);
            }
        }))
    }

    pub fn pause(&self) {
        if let Err(e) = self.inner.element.pause() {
            warn!("Pause failed: {}", e);
        }
    }

    pub fn seek(&self, time: f64) {
        if !time.is_finite() {
            debug!("Ignoring seek to non-finite time");
            return;
        }
        let mut target = time.max(0.0);
        if let Some(duration) = self.inner.element.duration().filter(|d| d.is_finite()) {
            target = target.min(duration);
        }
        if let Err(e) = self.inner.element.seek(target) {
            warn!("Seek to {:.3}s failed: {}", target, e);
        }
    }

    /// Установить скорость; возвращает фактически примененное значение
    pub fn set_rate(&self, rate: f64) -> f64 {
        let effective = clamp_rate(rate);
        if let Err(e) = self.inner.element.set_rate(effective) {
            warn!("Rate change to {} failed: {}", effective, e);
        }
        let mut current = self.inner.rate.lock();
        if *current != effective {
            *current = effective;
            drop(current);
            self.inner.emit(PlaybackEvent::RateChanged(effective));
        }
        effective
    }

    pub fn rate(&self) -> f64 {
        *self.inner.rate.lock()
    }

    pub fn current_time(&self) -> f64 {
        let time = self.inner.element.current_time();
        if time.is_finite() {
            time.max(0.0)
        } else {
            0.0
        }
    }

    pub fn duration(&self) -> Option<f64> {
        self.inner
            .element
            .duration()
            .filter(|d| d.is_finite() && *d > 0.0)
    }

    pub fn is_playing(&self) -> bool {
        self.inner.playing.load(Ordering::SeqCst)
    }

    /// Попросить переход к следующему чанку (обрабатывает владелец списка чанков)
    pub fn request_advance(&self) {
        self.inner.emit(PlaybackEvent::AdvanceRequested);
    }

    /// Полноэкранный режим; `false`, если элемент отказал и UI нужно откатить
    pub async fn ensure_fullscreen(&self) -> bool {
        match self.inner.element.request_fullscreen().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Fullscreen request rejected: {}", e);
                false
            }
        }
    }
}

pub struct PlaybackAdapter {
    handle: PlaybackHandle,
}

impl PlaybackAdapter {
    pub fn new(element: Arc<dyn MediaElement>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            handle: PlaybackHandle {
                inner: Arc::new(AdapterInner {
                    element,
                    events,
                    rate: Mutex::new(DEFAULT_RATE),
                    playing: AtomicBool::new(false),
                }),
            },
        }
    }

    /// Хэндл для регистрации в родителе
    pub fn handle(&self) -> PlaybackHandle {
        self.handle.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.handle.inner.events.subscribe()
    }

    pub fn play(&self) -> Option<JoinHandle<()>> {
        self.handle.play()
    }

    pub fn pause(&self) {
        self.handle.pause()
    }

    pub fn seek(&self, time: f64) {
        self.handle.seek(time)
    }

    pub fn set_rate(&self, rate: f64) -> f64 {
        self.handle.set_rate(rate)
    }

    pub fn current_time(&self) -> f64 {
        self.handle.current_time()
    }

    pub fn duration(&self) -> Option<f64> {
        self.handle.duration()
    }

    pub fn is_playing(&self) -> bool {
        self.handle.is_playing()
    }

    // События от нативного элемента

    pub fn notify_time_update(&self, raw: f64) {
        if !raw.is_finite() {
            return;
        }
        let mut time = raw.max(0.0);
        if let Some(duration) = self.duration() {
            time = time.min(duration);
        }
        self.handle.inner.emit(PlaybackEvent::TimeUpdate(time));
    }

    pub fn notify_playing(&self) {
        if !self.handle.inner.playing.swap(true, Ordering::SeqCst) {
            self.handle.inner.emit(PlaybackEvent::Playing);
        }
    }

    pub fn notify_paused(&self) {
        if self.handle.inner.playing.swap(false, Ordering::SeqCst) {
            self.handle.inner.emit(PlaybackEvent::Paused);
        }
    }

    pub fn notify_ended(&self) {
        self.handle.inner.playing.store(false, Ordering::SeqCst);
        self.handle.inner.emit(PlaybackEvent::Ended);
    }

    pub fn notify_duration(&self, duration: f64) {
        if duration.is_finite() && duration > 0.0 {
            self.handle.inner.emit(PlaybackEvent::DurationChanged(duration));
        }
    }
}

#[derive(Debug, Default)]
struct HeadlessState {
    time: f64,
    duration: Option<f64>,
    rate: f64,
    playing: bool,
}

/// Медиа-элемент без реального вывода: для тестов и окружений без медиа
#[derive(Debug, Default)]
pub struct HeadlessMediaElement {
    state: Mutex<HeadlessState>,
    autoplay_blocked: AtomicBool,
}

impl HeadlessMediaElement {
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                duration,
                rate: DEFAULT_RATE,
                ..Default::default()
            }),
            autoplay_blocked: AtomicBool::new(false),
        }
    }

    /// Эмулировать запрет автозапуска браузером
    pub fn block_autoplay(&self, blocked: bool) {
        self.autoplay_blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }
}

#[async_trait]
impl MediaElement for HeadlessMediaElement {
    async fn play(&self) -> ReaderResult<()> {
        if self.autoplay_blocked.load(Ordering::SeqCst) {
            return Err(ReaderError::Media("autoplay is not allowed".into()));
        }
        self.state.lock().playing = true;
        Ok(())
    }

    fn pause(&self) -> ReaderResult<()> {
        self.state.lock().playing = false;
        Ok(())
    }

    fn seek(&self, time: f64) -> ReaderResult<()> {
        self.state.lock().time = time;
        Ok(())
    }

    fn set_rate(&self, rate: f64) -> ReaderResult<()> {
        self.state.lock().rate = rate;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.state.lock().time
    }

    fn duration(&self) -> Option<f64> {
        self.state.lock().duration
    }

    async fn request_fullscreen(&self) -> ReaderResult<()> {
        Err(ReaderError::Media("fullscreen is not available".into()))
    }
}
