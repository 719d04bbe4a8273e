//! # Кэш и дедупликация запросов
//!
//! `RequestGate` хранит для каждого ключа признак "в полете", признак
//! успешного завершения и время последней попытки. Через него префетчер
//! решает, можно ли отправлять запрос. `SentenceCache` хранит загруженные
//! метаданные чанков: первая запись побеждает, перезаписи нет.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::SentenceMetadata;

/// Источник текущего времени
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Часы, которые двигаются только вручную (для тестов и детерминированных прогонов)
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Почему запрос не был разрешен
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRefusal {
    InFlight,
    Completed,
    RetryTooSoon,
}

struct GateState<K> {
    in_flight: HashSet<K>,
    completed: HashSet<K>,
    last_attempt: HashMap<K, Instant>,
}

/// Дедупликация и ограничение частоты повторов для одного вида запросов
pub struct RequestGate<K> {
    retry_interval: Duration,
    clock: Arc<dyn Clock>,
    state: Mutex<GateState<K>>,
}

impl<K> RequestGate<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(retry_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            retry_interval,
            clock,
            state: Mutex::new(GateState {
                in_flight: HashSet::new(),
                completed: HashSet::new(),
                last_attempt: HashMap::new(),
            }),
        }
    }

    /// Попробовать начать запрос. При успехе ключ помечается как "в полете".
    pub fn try_begin(&self, key: &K) -> Result<(), GateRefusal> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.completed.contains(key) {
            return Err(GateRefusal::Completed);
        }
        if state.in_flight.contains(key) {
            return Err(GateRefusal::InFlight);
        }
        if let Some(last) = state.last_attempt.get(key) {
            if now.saturating_duration_since(*last) < self.retry_interval {
                return Err(GateRefusal::RetryTooSoon);
            }
        }

        state.in_flight.insert(key.clone());
        state.last_attempt.insert(key.clone(), now);
        Ok(())
    }

    /// Завершить запрос. Успешные ключи больше не запрашиваются.
    pub fn finish(&self, key: &K, success: bool) {
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        if success {
            state.completed.insert(key.clone());
        }
    }

    /// Отметить ключ как уже полученный другим путем
    pub fn mark_completed(&self, key: &K) {
        let mut state = self.state.lock();
        state.in_flight.remove(key);
        state.completed.insert(key.clone());
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.state.lock().in_flight.contains(key)
    }

    pub fn is_completed(&self, key: &K) -> bool {
        self.state.lock().completed.contains(key)
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }
}

/// Кэш метаданных предложений по ключу чанка
#[derive(Default)]
pub struct SentenceCache {
    entries: Mutex<HashMap<String, Arc<Vec<SentenceMetadata>>>>,
}

impl SentenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Сохранить предложения, если для ключа еще ничего нет. Пустые списки не кэшируются.
    pub fn insert(&self, key: &str, sentences: Vec<SentenceMetadata>) -> bool {
        if sentences.is_empty() {
            return false;
        }
        let mut entries = self.entries.lock();
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), Arc::new(sentences));
        true
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<SentenceMetadata>>> {
        self.entries.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(clock: &ManualClock) -> RequestGate<String> {
        RequestGate::new(Duration::from_secs(6), Arc::new(clock.clone()))
    }

    #[test]
    fn in_flight_key_is_refused() {
        let clock = ManualClock::new();
        let gate = gate(&clock);
        let key = "chunk-1".to_string();

        assert!(gate.try_begin(&key).is_ok());
        assert_eq!(gate.try_begin(&key), Err(GateRefusal::InFlight));
        assert!(gate.is_in_flight(&key));
    }

    #[test]
    fn failed_key_waits_for_retry_interval() {
        let clock = ManualClock::new();
        let gate = gate(&clock);
        let key = "chunk-1".to_string();

        gate.try_begin(&key).unwrap();
        gate.finish(&key, false);

        clock.advance(Duration::from_millis(5_999));
        assert_eq!(gate.try_begin(&key), Err(GateRefusal::RetryTooSoon));

        clock.advance(Duration::from_millis(1));
        assert!(gate.try_begin(&key).is_ok());
    }

    #[test]
    fn completed_key_is_never_requested_again() {
        let clock = ManualClock::new();
        let gate = gate(&clock);
        let key = "https://x/a.mp3".to_string();

        gate.try_begin(&key).unwrap();
        gate.finish(&key, true);
        clock.advance(Duration::from_secs(3600));
        assert_eq!(gate.try_begin(&key), Err(GateRefusal::Completed));
    }

    #[test]
    fn sentence_cache_first_writer_wins() {
        let cache = SentenceCache::new();
        let first = vec![SentenceMetadata {
            sentence_number: 1,
            ..Default::default()
        }];
        let second = vec![SentenceMetadata {
            sentence_number: 2,
            ..Default::default()
        }];

        assert!(cache.insert("c", first));
        assert!(!cache.insert("c", second));
        assert_eq!(cache.get("c").unwrap()[0].sentence_number, 1);
        assert!(!cache.insert("empty", Vec::new()));
        assert_eq!(cache.len(), 1);
    }
}
