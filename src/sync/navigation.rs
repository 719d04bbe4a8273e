//! Клавиатурная навигация по токенам активного предложения.
//!
//! Left/Right двигают курсор внутри слоя (по кругу; с Shift расширяют
//! диапазон до границ), Up/Down переключают слой на том же индексе,
//! Enter отдает выделенный текст на lookup и поглощает событие.

use serde::Serialize;

use super::SyncResolver;
use crate::models::{SentenceMetadata, TokenRange, TokenSelection, VariantKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavKey {
    Left,
    Right,
    Up,
    Down,
    Enter,
}

impl NavKey {
    /// Имя клавиши в формате DOM `KeyboardEvent.key`
    pub fn from_key_name(name: &str) -> Option<Self> {
        match name {
            "ArrowLeft" => Some(NavKey::Left),
            "ArrowRight" => Some(NavKey::Right),
            "ArrowUp" => Some(NavKey::Up),
            "ArrowDown" => Some(NavKey::Down),
            "Enter" => Some(NavKey::Enter),
            _ => None,
        }
    }
}

/// Запрос на поиск определения/перевода выделенного текста
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest {
    pub sentence_index: usize,
    pub variant: VariantKind,
    pub start_index: usize,
    pub end_index: usize,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyOutcome {
    /// Событие обработано и не должно всплывать дальше
    pub handled: bool,
    pub lookup: Option<LookupRequest>,
}

impl KeyOutcome {
    fn ignored() -> Self {
        Self::default()
    }

    fn handled() -> Self {
        Self {
            handled: true,
            lookup: None,
        }
    }
}

impl SyncResolver {
    /// Слои, доступные для навигации: видимые и непустые, в порядке отображения
    fn navigation_order(&self, sentence: &SentenceMetadata) -> Vec<VariantKind> {
        VariantKind::DISPLAY_ORDER
            .iter()
            .copied()
            .filter(|kind| self.visibility.is_visible(*kind) && sentence.token_count(*kind) > 0)
            .collect()
    }

    fn cursor(
        &self,
        index: usize,
        sentence: &SentenceMetadata,
        order: &[VariantKind],
    ) -> TokenSelection {
        let from_current = self
            .manual
            .or(self.current)
            .filter(|c| c.sentence_index == index && order.contains(&c.variant))
            .and_then(|c| c.clamped(sentence.token_count(c.variant)));

        from_current.unwrap_or_else(|| {
            let variant = VariantKind::DEFAULT_PREFERENCE
                .iter()
                .copied()
                .find(|kind| order.contains(kind))
                .unwrap_or(order[0]);
            TokenSelection::new(index, variant, 0)
        })
    }

    pub fn handle_key(
        &mut self,
        key: NavKey,
        shift: bool,
        sentences: &[SentenceMetadata],
    ) -> KeyOutcome {
        let Some(index) = self.active_sentence else {
            return KeyOutcome::ignored();
        };
        let Some(sentence) = sentences.get(index) else {
            return KeyOutcome::ignored();
        };
        let order = self.navigation_order(sentence);
        if order.is_empty() {
            return KeyOutcome::ignored();
        }

        let cursor = self.cursor(index, sentence, &order);
        let count = sentence.token_count(cursor.variant);

        match key {
            NavKey::Left | NavKey::Right if shift => {
                let anchor = self
                    .range
                    .filter(|r| r.sentence_index == index && r.variant == cursor.variant)
                    .and(self.range_anchor)
                    .unwrap_or(cursor.token_index)
                    .min(count - 1);
                let focus = match key {
                    NavKey::Left => cursor.token_index.saturating_sub(1),
                    _ => (cursor.token_index + 1).min(count - 1),
                };
                self.range = Some(TokenRange::new(index, cursor.variant, anchor, focus));
                self.range_anchor = Some(anchor);
                self.set_manual(TokenSelection::new(index, cursor.variant, focus));
                KeyOutcome::handled()
            }
            NavKey::Left | NavKey::Right => {
                let next = match key {
                    NavKey::Left => (cursor.token_index + count - 1) % count,
                    _ => (cursor.token_index + 1) % count,
                };
                self.range = None;
                self.range_anchor = None;
                self.set_manual(TokenSelection::new(index, cursor.variant, next));
                KeyOutcome::handled()
            }
            NavKey::Up | NavKey::Down => {
                let position = order
                    .iter()
                    .position(|k| *k == cursor.variant)
                    .unwrap_or(0);
                let target = match key {
                    NavKey::Up => position.checked_sub(1),
                    _ => (position + 1 < order.len()).then_some(position + 1),
                };
                if let Some(target) = target.map(|t| order[t]) {
                    let last = sentence.token_count(target) - 1;
                    self.range = None;
                    self.range_anchor = None;
                    self.set_manual(TokenSelection::new(
                        index,
                        target,
                        cursor.token_index.min(last),
                    ));
                }
                KeyOutcome::handled()
            }
            NavKey::Enter => {
                let range = self
                    .range
                    .filter(|r| r.sentence_index == index && r.variant == cursor.variant)
                    .unwrap_or_else(|| {
                        let at = cursor.token_index;
                        TokenRange::new(index, cursor.variant, at, at)
                    });
                let tokens = &sentence.variant(range.variant).tokens;
                let end = range.end_index.min(tokens.len() - 1);
                let start = range.start_index.min(end);
                let text = tokens[start..=end].join(" ");

                KeyOutcome {
                    handled: true,
                    lookup: Some(LookupRequest {
                        sentence_index: index,
                        variant: range.variant,
                        start_index: start,
                        end_index: end,
                        text,
                    }),
                }
            }
        }
    }

    fn set_manual(&mut self, selection: TokenSelection) {
        self.manual = Some(selection);
        self.current = Some(selection);
    }
}
