//! # Запрос на запуск пайплайна
//!
//! Модель формы отправки: исходный EPUB, языки, голос и параметры
//! производительности. Валидация возвращает понятные пользователю сообщения.

use serde::{Deserialize, Serialize};

use crate::error::{ReaderError, ReaderResult};
use crate::preferences::UiPreferences;

pub const MAX_THREADS: usize = 64;
pub const MAX_TEMPO: f64 = 4.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineRequest {
    /// Путь к EPUB в хранилище backend-а
    pub input_file: String,
    pub base_output_file: String,
    pub input_language: String,
    pub target_languages: Vec<String>,
    pub start_sentence: usize,
    pub end_sentence: Option<usize>,
    pub sentences_per_output_file: usize,
    pub include_transliteration: bool,
    pub generate_audio: bool,
    pub generate_video: bool,
    pub selected_voice: Option<String>,
    pub tempo: f64,
    pub thread_count: usize,
    pub queue_size: usize,
    pub llm_model: Option<String>,
    pub system_prompt: Option<String>,
}

impl Default for PipelineRequest {
    fn default() -> Self {
        Self {
            input_file: String::new(),
            base_output_file: String::new(),
            input_language: "English".to_string(),
            target_languages: Vec::new(),
            start_sentence: 1,
            end_sentence: None,
            sentences_per_output_file: 10,
            include_transliteration: false,
            generate_audio: true,
            generate_video: false,
            selected_voice: None,
            tempo: 1.0,
            thread_count: 4,
            queue_size: 20,
            llm_model: None,
            system_prompt: None,
        }
    }
}

impl PipelineRequest {
    pub fn new(input_file: impl Into<String>) -> Self {
        Self {
            input_file: input_file.into(),
            ..Default::default()
        }
    }

    /// Подставить незаполненные поля из сохраненных настроек
    pub fn with_saved_preferences(mut self, prefs: &UiPreferences<'_>) -> Self {
        if self.target_languages.is_empty() {
            if let Some(language) = prefs.last_language() {
                self.target_languages.push(language);
            }
        }
        if self.llm_model.is_none() {
            self.llm_model = prefs.last_llm_model();
        }
        if self.system_prompt.is_none() {
            self.system_prompt = prefs.system_prompt();
        }
        self
    }

    /// Имя выходного файла: явное или производное от имени EPUB
    pub fn output_base_name(&self) -> String {
        let explicit = self.base_output_file.trim();
        if !explicit.is_empty() {
            return explicit.to_string();
        }
        let file_name = self
            .input_file
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        let stem = match file_name.rfind('.') {
            Some(dot) if dot > 0 => &file_name[..dot],
            _ => file_name,
        };
        let language = self
            .target_languages
            .first()
            .map(|l| l.trim().to_lowercase().replace(' ', "-"))
            .unwrap_or_default();
        if language.is_empty() {
            stem.to_string()
        } else {
            format!("{}-{}", stem, language)
        }
    }

    pub fn validate(&self) -> ReaderResult<()> {
        let fail = |message: &str| Err(ReaderError::Validation(message.to_string()));

        let input = self.input_file.trim();
        if input.is_empty() {
            return fail("Choose an EPUB file to process.");
        }
        if !input.to_ascii_lowercase().ends_with(".epub") {
            return fail("The source file must be an EPUB.");
        }
        if self.input_language.trim().is_empty() {
            return fail("Select the language of the book.");
        }
        if self.target_languages.is_empty() {
            return fail("Select at least one target language.");
        }
        if self.target_languages.iter().any(|l| l.trim().is_empty()) {
            return fail("Target languages cannot be blank.");
        }
        if self.start_sentence == 0 {
            return fail("Sentences are numbered from 1.");
        }
        if let Some(end) = self.end_sentence {
            if end < self.start_sentence {
                return fail("The end sentence must not come before the start sentence.");
            }
        }
        if self.sentences_per_output_file == 0 {
            return fail("Each output file needs at least one sentence.");
        }
        if !self.tempo.is_finite() || self.tempo <= 0.0 || self.tempo > MAX_TEMPO {
            return Err(ReaderError::Validation(format!(
                "Tempo must be greater than 0 and at most {}.",
                MAX_TEMPO
            )));
        }
        if self.thread_count == 0 || self.thread_count > MAX_THREADS {
            return Err(ReaderError::Validation(format!(
                "Thread count must be between 1 and {}.",
                MAX_THREADS
            )));
        }
        if self.queue_size == 0 {
            return fail("Queue size must be at least 1.");
        }
        if self.generate_video && !self.generate_audio {
            return fail("Video generation requires audio generation.");
        }
        Ok(())
    }
}

/// Ответ backend-а на создание задания
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSubmission {
    pub job_id: String,
    #[serde(default)]
    pub status: String,
}
