//! Приоритет ручного выделения над подсветкой по таймингу

use super::sample_sentences;
use crate::models::{CueVisibility, SentenceMetadata, TokenSelection, VariantKind};
use crate::sync::{SelectionSource, SyncInput, SyncResolver, ViewModel};

fn step(
    resolver: &mut SyncResolver,
    sentences: &[SentenceMetadata],
    time: f64,
    playing: bool,
    visibility: CueVisibility,
) -> ViewModel {
    resolver.update(SyncInput {
        chunk_key: "chunk-1",
        sentences,
        time,
        is_playing: playing,
        visibility,
    })
}

#[test]
fn timing_default_prefers_translation() {
    let sentences = sample_sentences();
    let mut resolver = SyncResolver::new();

    let view = step(&mut resolver, &sentences, 1.5, true, CueVisibility::default());
    assert_eq!(view.active_sentence, Some(0));
    assert_eq!(
        view.selection,
        Some(TokenSelection::new(0, VariantKind::Translation, 1))
    );
    assert_eq!(view.selection_source, Some(SelectionSource::Timing));
    assert_eq!(view.highlighted_text(), Some("good"));
}

#[test]
fn hidden_variants_fall_through_preference_order() {
    let sentences = sample_sentences();
    let mut resolver = SyncResolver::new();

    let mut visibility = CueVisibility::default();
    visibility.set(VariantKind::Translation, false);
    let view = step(&mut resolver, &sentences, 1.5, true, visibility);
    assert_eq!(view.selection.map(|s| s.variant), Some(VariantKind::Translit));

    visibility.set(VariantKind::Translit, false);
    let view = step(&mut resolver, &sentences, 1.6, true, visibility);
    assert_eq!(
        view.selection,
        Some(TokenSelection::new(0, VariantKind::Original, 1))
    );
    let sentence = view.sentence.unwrap();
    assert_eq!(sentence.variants.len(), 1);
    assert_eq!(sentence.variants[0].kind, VariantKind::Original);
}

#[test]
fn manual_selection_wins_while_paused_and_clears_on_play() {
    let sentences = sample_sentences();
    let mut resolver = SyncResolver::new();

    step(&mut resolver, &sentences, 1.5, false, CueVisibility::default());
    assert!(resolver.select_token(
        TokenSelection::new(0, VariantKind::Translation, 3),
        &sentences
    ));

    let paused = step(&mut resolver, &sentences, 1.5, false, CueVisibility::default());
    assert_eq!(
        paused.selection,
        Some(TokenSelection::new(0, VariantKind::Translation, 3))
    );
    assert_eq!(paused.selection_source, Some(SelectionSource::Manual));

    let playing = step(&mut resolver, &sentences, 1.5, true, CueVisibility::default());
    assert_eq!(
        playing.selection,
        Some(TokenSelection::new(0, VariantKind::Translation, 1))
    );
    assert_eq!(playing.selection_source, Some(SelectionSource::Timing));
    assert!(resolver.manual_selection().is_none());

    // После паузы ручное выделение не возвращается
    let paused_again = step(&mut resolver, &sentences, 1.5, false, CueVisibility::default());
    assert_eq!(paused_again.selection_source, Some(SelectionSource::Timing));
}

#[test]
fn out_of_range_token_index_is_clamped() {
    let sentences = sample_sentences();
    let mut resolver = SyncResolver::new();

    step(&mut resolver, &sentences, 0.5, false, CueVisibility::default());
    assert!(resolver.select_token(
        TokenSelection::new(0, VariantKind::Original, 42),
        &sentences
    ));
    let view = step(&mut resolver, &sentences, 0.5, false, CueVisibility::default());
    assert_eq!(
        view.selection,
        Some(TokenSelection::new(0, VariantKind::Original, 2))
    );
    assert_eq!(view.highlighted_text(), Some("mundo"));
}

#[test]
fn selection_on_empty_variant_is_rejected() {
    let sentences = sample_sentences();
    let mut resolver = SyncResolver::new();

    step(&mut resolver, &sentences, 5.0, false, CueVisibility::default());
    assert!(!resolver.select_token(
        TokenSelection::new(1, VariantKind::Translit, 0),
        &sentences
    ));
    // Предложение, которое сейчас не активно
    assert!(!resolver.select_token(
        TokenSelection::new(0, VariantKind::Translation, 0),
        &sentences
    ));
}

#[test]
fn sentence_change_discards_stale_manual_selection() {
    let sentences = sample_sentences();
    let mut resolver = SyncResolver::new();

    step(&mut resolver, &sentences, 1.5, false, CueVisibility::default());
    resolver.select_token(TokenSelection::new(0, VariantKind::Translation, 3), &sentences);

    let view = step(&mut resolver, &sentences, 5.0, false, CueVisibility::default());
    assert_eq!(view.active_sentence, Some(1));
    assert_eq!(view.selection_source, Some(SelectionSource::Timing));
    assert_eq!(
        view.selection,
        Some(TokenSelection::new(1, VariantKind::Translation, 1))
    );
    assert!(resolver.manual_selection().is_none());
}

#[test]
fn hiding_the_selected_variant_drops_manual_selection() {
    let sentences = sample_sentences();
    let mut resolver = SyncResolver::new();

    step(&mut resolver, &sentences, 1.5, false, CueVisibility::default());
    resolver.select_token(TokenSelection::new(0, VariantKind::Original, 0), &sentences);

    let mut visibility = CueVisibility::default();
    visibility.set(VariantKind::Original, false);
    let view = step(&mut resolver, &sentences, 1.5, false, visibility);
    assert_eq!(view.selection_source, Some(SelectionSource::Timing));
    assert_eq!(view.selection.map(|s| s.variant), Some(VariantKind::Translation));
}

#[test]
fn shadow_mirrors_parallel_variant_with_equal_length() {
    let sentences = sample_sentences();
    let mut resolver = SyncResolver::new();

    let view = step(&mut resolver, &sentences, 2.5, true, CueVisibility::default());
    assert_eq!(
        view.shadow,
        Some(TokenSelection::new(0, VariantKind::Translit, 2))
    );
    let translit = view.sentence.as_ref().unwrap().variant(VariantKind::Translit).unwrap();
    assert!(translit.tokens[2].shadow);

    // Во втором предложении translit пуст: тени нет
    let view = step(&mut resolver, &sentences, 5.0, true, CueVisibility::default());
    assert!(view.shadow.is_none());
}

#[test]
fn shadow_skips_original_and_mismatched_lengths() {
    let sentences = sample_sentences();
    let mut resolver = SyncResolver::new();

    step(&mut resolver, &sentences, 1.5, false, CueVisibility::default());
    resolver.select_token(TokenSelection::new(0, VariantKind::Original, 1), &sentences);
    let view = step(&mut resolver, &sentences, 1.5, false, CueVisibility::default());
    assert!(view.shadow.is_none());
}

#[test]
fn before_first_sentence_nothing_is_highlighted() {
    let mut sentences = sample_sentences();
    sentences[0].start_time = Some(1.0);
    let mut resolver = SyncResolver::new();

    let view = step(&mut resolver, &sentences, 0.2, true, CueVisibility::default());
    assert_eq!(view.active_sentence, Some(0));
    assert!(view.selection.is_none());
}
