//! Чистый рендер view-model в текст (для терминала, логов и снапшот-тестов).

use crate::sync::{TokenView, ViewModel};

fn render_token(token: &TokenView) -> String {
    if token.highlighted {
        format!("[{}]", token.text)
    } else if token.shadow {
        format!("{{{}}}", token.text)
    } else if token.in_range {
        format!("<{}>", token.text)
    } else {
        token.text.clone()
    }
}

/// Одна строка на каждый видимый слой активного предложения.
///
/// Подсвеченный токен - `[tok]`, теневой - `{tok}`, остальные токены диапазона - `<tok>`.
pub fn render_plain(view: &ViewModel) -> String {
    let Some(sentence) = &view.sentence else {
        return String::new();
    };

    sentence
        .variants
        .iter()
        .filter(|variant| !variant.tokens.is_empty())
        .map(|variant| {
            let tokens: Vec<String> = variant.tokens.iter().map(render_token).collect();
            format!("{:<11} {}", variant.kind.as_str(), tokens.join(" "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CueVisibility, SentenceMetadata, VariantKind, VariantTokens};
    use crate::sync::{SyncInput, SyncResolver};

    fn sentences() -> Vec<SentenceMetadata> {
        vec![SentenceMetadata {
            sentence_number: 7,
            original: VariantTokens::new(&["Guten", "Tag"]),
            transliteration: VariantTokens::default(),
            translation: VariantTokens::new(&["Good", "day"]),
            start_time: Some(0.0),
            end_time: Some(2.0),
        }]
    }

    #[test]
    fn highlights_active_token_and_skips_empty_layers() {
        let sentences = sentences();
        let mut resolver = SyncResolver::new();
        let view = resolver.update(SyncInput {
            chunk_key: "c",
            sentences: &sentences,
            time: 1.5,
            is_playing: true,
            visibility: CueVisibility::default(),
        });

        assert_eq!(
            render_plain(&view),
            "original    Guten Tag\ntranslation Good [day]"
        );
    }

    #[test]
    fn hidden_layers_are_not_rendered() {
        let sentences = sentences();
        let mut resolver = SyncResolver::new();
        let mut visibility = CueVisibility::default();
        visibility.set(VariantKind::Original, false);
        let view = resolver.update(SyncInput {
            chunk_key: "c",
            sentences: &sentences,
            time: 0.5,
            is_playing: true,
            visibility,
        });
        assert_eq!(render_plain(&view), "translation [Good] day");
    }

    #[test]
    fn empty_view_renders_nothing() {
        assert_eq!(render_plain(&ViewModel::default()), "");
    }
}
