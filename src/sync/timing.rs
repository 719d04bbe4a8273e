//! Сопоставление времени воспроизведения с предложением и токеном.

use std::collections::HashMap;

use crate::models::{SentenceMetadata, VariantKind};

/// Откат назад больше этого порога считается перемоткой
pub const SEEK_BACK_THRESHOLD: f64 = 0.05;

/// Предложение, активное в момент `time`.
///
/// Сначала ищется предложение, в окно которого попадает время. В паузе между
/// предложениями активным остается последнее начавшееся. До первого
/// предложения активного нет.
pub fn active_sentence_index(sentences: &[SentenceMetadata], time: f64) -> Option<usize> {
    if !time.is_finite() {
        return None;
    }

    let mut last_started = None;
    for (index, sentence) in sentences.iter().enumerate() {
        let Some((start, end)) = sentence.time_window() else {
            continue;
        };
        if time >= start && time < end {
            return Some(index);
        }
        if time >= start {
            match last_started {
                Some((_, best)) if best > start => {}
                _ => last_started = Some((index, start)),
            }
        }
    }
    last_started.map(|(index, _)| index)
}

/// Индекс текущего токена слоя в момент `time`.
///
/// Явные `token_times` имеют приоритет; без них окно предложения делится
/// на токены поровну.
pub fn token_index_at(sentence: &SentenceMetadata, kind: VariantKind, time: f64) -> Option<usize> {
    let variant = sentence.variant(kind);
    let count = variant.len();
    if count == 0 || !time.is_finite() {
        return None;
    }

    if let Some(times) = variant.token_times.as_ref().filter(|t| !t.is_empty()) {
        let first = times[0];
        if !first.is_finite() || time < first {
            return None;
        }
        let passed = times
            .iter()
            .take(count)
            .take_while(|t| t.is_finite() && **t <= time)
            .count();
        return Some(passed.saturating_sub(1).min(count - 1));
    }

    let (start, end) = sentence.time_window()?;
    if time < start {
        return None;
    }
    if time >= end {
        return Some(count - 1);
    }
    let progress = (time - start) / (end - start);
    let index = (progress * count as f64).floor() as usize;
    Some(index.min(count - 1))
}

/// Сколько токенов каждого слоя уже было подсвечено
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevealCounts {
    pub original: usize,
    pub translit: usize,
    pub translation: usize,
}

impl RevealCounts {
    pub fn get(&self, kind: VariantKind) -> usize {
        match kind {
            VariantKind::Original => self.original,
            VariantKind::Translit => self.translit,
            VariantKind::Translation => self.translation,
        }
    }

    fn raise(&mut self, kind: VariantKind, count: usize) {
        let slot = match kind {
            VariantKind::Original => &mut self.original,
            VariantKind::Translit => &mut self.translit,
            VariantKind::Translation => &mut self.translation,
        };
        *slot = (*slot).max(count);
    }
}

/// Память прогрессивного раскрытия по индексу предложения
#[derive(Debug, Clone, Default)]
pub struct RevealMemory {
    counts: HashMap<usize, RevealCounts>,
}

impl RevealMemory {
    /// Увеличить счетчик; уменьшить его нельзя
    pub fn raise(&mut self, sentence_index: usize, kind: VariantKind, count: usize) {
        self.counts
            .entry(sentence_index)
            .or_default()
            .raise(kind, count);
    }

    pub fn get(&self, sentence_index: usize) -> RevealCounts {
        self.counts.get(&sentence_index).copied().unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VariantTokens;

    fn sentence(start: f64, end: f64, tokens: &[&str]) -> SentenceMetadata {
        SentenceMetadata {
            sentence_number: 1,
            translation: VariantTokens::new(tokens),
            start_time: Some(start),
            end_time: Some(end),
            ..Default::default()
        }
    }

    #[test]
    fn active_sentence_tracks_windows_and_gaps() {
        let sentences = vec![sentence(1.0, 2.0, &["a"]), sentence(2.5, 4.0, &["b"])];
        assert_eq!(active_sentence_index(&sentences, 0.5), None);
        assert_eq!(active_sentence_index(&sentences, 1.0), Some(0));
        assert_eq!(active_sentence_index(&sentences, 2.2), Some(0));
        assert_eq!(active_sentence_index(&sentences, 3.0), Some(1));
        assert_eq!(active_sentence_index(&sentences, 10.0), Some(1));
        assert_eq!(active_sentence_index(&sentences, f64::NAN), None);
    }

    #[test]
    fn even_split_without_token_times() {
        let s = sentence(0.0, 4.0, &["one", "two", "three", "four"]);
        assert_eq!(token_index_at(&s, VariantKind::Translation, 0.0), Some(0));
        assert_eq!(token_index_at(&s, VariantKind::Translation, 1.5), Some(1));
        assert_eq!(token_index_at(&s, VariantKind::Translation, 3.99), Some(3));
        assert_eq!(token_index_at(&s, VariantKind::Translation, 9.0), Some(3));
        assert_eq!(token_index_at(&s, VariantKind::Original, 1.0), None);
    }

    #[test]
    fn explicit_token_times_win() {
        let mut s = sentence(0.0, 4.0, &["a", "b", "c"]);
        s.translation.token_times = Some(vec![0.5, 0.6, 3.5]);
        assert_eq!(token_index_at(&s, VariantKind::Translation, 0.2), None);
        assert_eq!(token_index_at(&s, VariantKind::Translation, 0.55), Some(0));
        assert_eq!(token_index_at(&s, VariantKind::Translation, 2.0), Some(1));
        assert_eq!(token_index_at(&s, VariantKind::Translation, 3.9), Some(2));
    }

    #[test]
    fn reveal_counts_never_shrink() {
        let mut memory = RevealMemory::default();
        memory.raise(0, VariantKind::Original, 3);
        memory.raise(0, VariantKind::Original, 1);
        assert_eq!(memory.get(0).original, 3);
        assert_eq!(memory.get(1), RevealCounts::default());
        memory.clear();
        assert!(memory.is_empty());
    }
}
