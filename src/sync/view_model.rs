//! Явная view-model, которую строит резолвер и потребляет рендер.

use serde::Serialize;

use crate::models::{TokenRange, TokenSelection, VariantKind};

/// Откуда взялась текущая подсветка
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionSource {
    Timing,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenView {
    pub text: String,
    pub revealed: bool,
    pub highlighted: bool,
    pub shadow: bool,
    pub in_range: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantView {
    pub kind: VariantKind,
    pub revealed_count: usize,
    pub tokens: Vec<TokenView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentenceView {
    pub index: usize,
    pub sentence_number: usize,
    /// Только видимые слои, в порядке отображения
    pub variants: Vec<VariantView>,
}

impl SentenceView {
    pub fn variant(&self, kind: VariantKind) -> Option<&VariantView> {
        self.variants.iter().find(|v| v.kind == kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewModel {
    pub chunk_key: Option<String>,
    pub time: f64,
    pub is_playing: bool,
    pub active_sentence: Option<usize>,
    pub selection: Option<TokenSelection>,
    pub selection_source: Option<SelectionSource>,
    pub shadow: Option<TokenSelection>,
    pub range: Option<TokenRange>,
    pub sentence: Option<SentenceView>,
}

impl ViewModel {
    /// Текст подсвеченного токена
    pub fn highlighted_text(&self) -> Option<&str> {
        let selection = self.selection?;
        self.sentence
            .as_ref()?
            .variant(selection.variant)?
            .tokens
            .get(selection.token_index)
            .map(|t| t.text.as_str())
    }
}
