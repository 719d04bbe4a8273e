//! # Синхронизация текста с аудио
//!
//! `SyncResolver` по времени воспроизведения и загруженным предложениям
//! определяет активное предложение и токен, ведет память раскрытия и
//! согласует подсветку по таймингу с ручным выделением (клик/клавиатура).
//! Результат каждого шага - [`ViewModel`], которую рендер потребляет как есть.

pub mod navigation;
pub mod timing;
pub mod view_model;

use log::debug;

use crate::models::{CueVisibility, SentenceMetadata, TokenRange, TokenSelection, VariantKind};

pub use navigation::{KeyOutcome, LookupRequest, NavKey};
pub use timing::{RevealCounts, RevealMemory, SEEK_BACK_THRESHOLD};
pub use view_model::{SelectionSource, SentenceView, TokenView, VariantView, ViewModel};

/// Входные данные одного шага синхронизации
#[derive(Debug, Clone, Copy)]
pub struct SyncInput<'a> {
    pub chunk_key: &'a str,
    pub sentences: &'a [SentenceMetadata],
    /// Время относительно начала аудио чанка, сек
    pub time: f64,
    pub is_playing: bool,
    pub visibility: CueVisibility,
}

#[derive(Debug, Default)]
pub struct SyncResolver {
    chunk_key: Option<String>,
    last_time: Option<f64>,
    reveal: RevealMemory,
    active_sentence: Option<usize>,
    manual: Option<TokenSelection>,
    range: Option<TokenRange>,
    range_anchor: Option<usize>,
    /// Последняя эффективная подсветка (точка отсчета для навигации)
    current: Option<TokenSelection>,
    visibility: CueVisibility,
    is_playing: bool,
}

impl SyncResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_sentence(&self) -> Option<usize> {
        self.active_sentence
    }

    pub fn manual_selection(&self) -> Option<TokenSelection> {
        self.manual
    }

    pub fn current_selection(&self) -> Option<TokenSelection> {
        self.current
    }

    pub fn reveal(&self) -> &RevealMemory {
        &self.reveal
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Сбросить ручное выделение и диапазон
    pub fn clear_manual(&mut self) {
        self.manual = None;
        self.range = None;
        self.range_anchor = None;
    }

    fn reset_for_chunk(&mut self, chunk_key: &str) {
        debug!("Sync state reset for chunk {}", chunk_key);
        self.chunk_key = Some(chunk_key.to_string());
        self.last_time = None;
        self.reveal.clear();
        self.active_sentence = None;
        self.current = None;
        self.clear_manual();
    }

    /// Ручной выбор токена (клик). Принимается только в активном предложении.
    pub fn select_token(
        &mut self,
        selection: TokenSelection,
        sentences: &[SentenceMetadata],
    ) -> bool {
        if Some(selection.sentence_index) != self.active_sentence {
            return false;
        }
        let Some(sentence) = sentences.get(selection.sentence_index) else {
            return false;
        };
        match selection.clamped(sentence.token_count(selection.variant)) {
            Some(selection) => {
                self.clear_manual();
                self.manual = Some(selection);
                self.current = Some(selection);
                true
            }
            None => false,
        }
    }

    /// Один шаг синхронизации
    pub fn update(&mut self, input: SyncInput<'_>) -> ViewModel {
        if self.chunk_key.as_deref() != Some(input.chunk_key) {
            self.reset_for_chunk(input.chunk_key);
        }

        let time = if input.time.is_finite() {
            input.time.max(0.0)
        } else {
            self.last_time.unwrap_or(0.0)
        };
        if let Some(last) = self.last_time {
            if last - time > SEEK_BACK_THRESHOLD {
                debug!("Seek back {:.3}s -> {:.3}s, reveal memory cleared", last, time);
                self.reveal.clear();
            }
        }
        self.last_time = Some(time);
        self.visibility = input.visibility;
        self.is_playing = input.is_playing;

        let timed = timing::active_sentence_index(input.sentences, time);
        let active = timed
            .or(self.active_sentence)
            .filter(|i| *i < input.sentences.len())
            .or_else(|| (!input.sentences.is_empty()).then_some(0));

        if self.active_sentence.is_some() && self.active_sentence != active {
            self.clear_manual();
        }
        self.active_sentence = active;
        if input.is_playing {
            self.clear_manual();
        }

        let Some((index, sentence)) = active.and_then(|i| input.sentences.get(i).map(|s| (i, s)))
        else {
            self.current = None;
            return ViewModel {
                chunk_key: self.chunk_key.clone(),
                time,
                is_playing: input.is_playing,
                ..Default::default()
            };
        };

        // Тайминговые индексы считаются, только если время действительно внутри предложений
        let timing_index = |kind: VariantKind| -> Option<usize> {
            if timed != Some(index) {
                return None;
            }
            timing::token_index_at(sentence, kind, time)
        };

        for kind in VariantKind::DISPLAY_ORDER {
            if let Some(token) = timing_index(kind) {
                self.reveal.raise(index, kind, token + 1);
            }
        }

        let default_selection = VariantKind::DEFAULT_PREFERENCE
            .iter()
            .copied()
            .filter(|kind| input.visibility.is_visible(*kind))
            .find_map(|kind| {
                timing_index(kind).map(|token| TokenSelection::new(index, kind, token))
            });

        let manual_selection = if input.is_playing {
            None
        } else {
            self.manual
                .filter(|m| m.sentence_index == index && input.visibility.is_visible(m.variant))
                .and_then(|m| m.clamped(sentence.token_count(m.variant)))
        };
        if self.manual.is_some() && manual_selection.is_none() {
            // Устаревшее выделение (другое предложение или скрытый слой)
            self.clear_manual();
        }

        let (selection, source) = match (manual_selection, default_selection) {
            (Some(manual), _) => (Some(manual), Some(SelectionSource::Manual)),
            (None, Some(default)) => (Some(default), Some(SelectionSource::Timing)),
            (None, None) => (None, None),
        };
        self.manual = manual_selection;
        self.current = selection;

        let range = match (manual_selection, self.range) {
            (Some(manual), Some(range))
                if range.sentence_index == index && range.variant == manual.variant =>
            {
                let last = sentence.token_count(range.variant) - 1;
                Some(TokenRange::new(
                    index,
                    range.variant,
                    range.start_index.min(last),
                    range.end_index.min(last),
                ))
            }
            _ => None,
        };
        if range.is_none() {
            self.range = None;
            self.range_anchor = None;
        }

        let shadow = selection.and_then(|s| shadow_selection(s, sentence, input.visibility));
        let view = self.sentence_view(index, sentence, selection, shadow, range);

        ViewModel {
            chunk_key: self.chunk_key.clone(),
            time,
            is_playing: input.is_playing,
            active_sentence: Some(index),
            selection,
            selection_source: source,
            shadow,
            range,
            sentence: Some(view),
        }
    }

    fn sentence_view(
        &self,
        index: usize,
        sentence: &SentenceMetadata,
        selection: Option<TokenSelection>,
        shadow: Option<TokenSelection>,
        range: Option<TokenRange>,
    ) -> SentenceView {
        let revealed = self.reveal.get(index);
        let variants = VariantKind::DISPLAY_ORDER
            .iter()
            .copied()
            .filter(|kind| self.visibility.is_visible(*kind))
            .map(|kind| {
                let revealed_count = revealed.get(kind);
                let matches = |sel: Option<TokenSelection>, i: usize| {
                    sel.map(|s| s.variant == kind && s.token_index == i)
                        .unwrap_or(false)
                };
                let tokens = sentence
                    .variant(kind)
                    .tokens
                    .iter()
                    .enumerate()
                    .map(|(i, text)| TokenView {
                        text: text.clone(),
                        revealed: i < revealed_count,
                        highlighted: matches(selection, i),
                        shadow: matches(shadow, i),
                        in_range: range
                            .map(|r| r.variant == kind && r.contains(i))
                            .unwrap_or(false),
                    })
                    .collect();
                VariantView {
                    kind,
                    revealed_count,
                    tokens,
                }
            })
            .collect();

        SentenceView {
            index,
            sentence_number: sentence.sentence_number,
            variants,
        }
    }
}

/// Зеркальная подсветка в параллельном слое с тем же числом токенов
pub fn shadow_selection(
    selection: TokenSelection,
    sentence: &SentenceMetadata,
    visibility: CueVisibility,
) -> Option<TokenSelection> {
    let other = selection.variant.opposite()?;
    if !visibility.is_visible(other) {
        return None;
    }
    let count = sentence.token_count(selection.variant);
    if count == 0 || sentence.token_count(other) != count {
        return None;
    }
    Some(TokenSelection {
        variant: other,
        ..selection
    })
}
