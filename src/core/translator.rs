//! Paragraph-aligned chunked translation with per-chunk fallback

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::core::errors::{RelayError, Result};
use crate::core::key_pool::KeyPool;
use crate::core::models::Prompt;
use crate::core::retrier::RotationRetrier;

/// Separator between paragraphs and between reassembled chunks
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Chunking and pacing settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSettings {
    /// Upper bound on chunk length in characters, unless one paragraph is longer
    pub max_chunk_chars: usize,
    /// Wait between chunk submissions
    pub chunk_delay: Duration,
    pub target_language: String,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            max_chunk_chars: 2000,
            chunk_delay: Duration::from_secs(1),
            target_language: "Spanish".to_string(),
        }
    }
}

/// Result of a chunked translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationReport {
    pub text: String,
    pub total_chunks: usize,
    /// Chunks that came back translated, the rest kept their original text
    pub translated_chunks: usize,
}

impl TranslationReport {
    pub fn is_complete(&self) -> bool {
        self.translated_chunks == self.total_chunks
    }
}

fn paragraph_break() -> &'static Regex {
    static PARAGRAPH_BREAK: OnceLock<Regex> = OnceLock::new();
    PARAGRAPH_BREAK.get_or_init(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"))
}

/// Split `text` on blank lines and pack paragraphs greedily into chunks of at most
/// `max_chars` characters. A paragraph longer than `max_chars` becomes its own chunk.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let separator_len = CHUNK_SEPARATOR.chars().count();
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in paragraph_break()
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let paragraph_len = paragraph.chars().count();

        if current_len > 0 && current_len + separator_len + paragraph_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if current_len > 0 {
            current.push_str(CHUNK_SEPARATOR);
            current_len += separator_len;
        }
        current.push_str(paragraph);
        current_len += paragraph_len;
    }

    if current_len > 0 {
        chunks.push(current);
    }

    chunks
}

/// Join chunks in order with a blank line between them
pub fn reassemble<S: AsRef<str>>(chunks: &[S]) -> String {
    chunks
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}

fn chunk_instruction(target_language: &str, index: usize, total: usize, chunk: &str) -> String {
    format!(
        "Translate the following text to {target_language}. \
         This is part {index} of {total} of a longer document, \
         keep the tone consistent with the other parts. \
         Preserve all formatting (markdown, lists, code blocks).\n\n\
         Text:\n{chunk}\n\n\
         Translation (output ONLY the translation, nothing else):"
    )
}

/// Translates long text chunk by chunk through a [`RotationRetrier`]
#[derive(Clone)]
pub struct ChunkTranslator {
    retrier: Arc<RotationRetrier>,
    settings: ChunkSettings,
}

impl ChunkTranslator {
    pub fn new(retrier: Arc<RotationRetrier>, settings: ChunkSettings) -> Self {
        Self { retrier, settings }
    }

    pub fn settings(&self) -> &ChunkSettings {
        &self.settings
    }

    /// Translate `text`, keeping the original of every chunk that could not be translated
    pub async fn translate(
        &self,
        text: &str,
        preferred_model: &str,
        pool: &KeyPool,
    ) -> Result<TranslationReport> {
        self.translate_with_progress(text, preferred_model, pool, |_, _| {})
            .await
    }

    /// Like [`translate`](Self::translate), calling `on_chunk(done, total)` after each chunk
    pub async fn translate_with_progress<F>(
        &self,
        text: &str,
        preferred_model: &str,
        pool: &KeyPool,
        mut on_chunk: F,
    ) -> Result<TranslationReport>
    where
        F: FnMut(usize, usize),
    {
        if pool.is_empty() {
            return Err(RelayError::PoolExhausted {
                pool: pool.name().to_string(),
            });
        }

        let chunks = split_into_chunks(text, self.settings.max_chunk_chars);
        let total = chunks.len();
        info!(
            "Translating {} chars in {} chunks to {}",
            text.chars().count(),
            total,
            self.settings.target_language
        );

        let mut output = Vec::with_capacity(total);
        let mut translated = 0;

        for (i, chunk) in chunks.into_iter().enumerate() {
            if i > 0 {
                sleep(self.settings.chunk_delay).await;
            }

            let prompt = Prompt::text(chunk_instruction(
                &self.settings.target_language,
                i + 1,
                total,
                &chunk,
            ));

            match self
                .retrier
                .call_with_rotation(preferred_model, &prompt, pool)
                .await
            {
                Ok(translation) => {
                    debug!("Chunk {}/{} translated", i + 1, total);
                    translated += 1;
                    output.push(translation);
                }
                Err(e) => {
                    warn!("Chunk {}/{} failed, keeping original: {}", i + 1, total, e);
                    output.push(chunk);
                }
            }

            on_chunk(i + 1, total);
        }

        Ok(TranslationReport {
            text: reassemble(&output),
            total_chunks: total,
            translated_chunks: translated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::invoker::InvokeOutcome;
    use crate::core::models::{Credential, FallbackChain};
    use crate::core::retrier::RetryPolicy;
    use crate::core::testing::{retryable, ScriptedProvider};

    fn paragraph(c: char, len: usize) -> String {
        std::iter::repeat(c).take(len).collect()
    }

    fn pool() -> KeyPool {
        KeyPool::new("translate", vec![Credential::new("k1"), Credential::new("k2")])
    }

    fn translator(provider: Arc<ScriptedProvider>, chunk_delay: Duration) -> ChunkTranslator {
        let retrier = RotationRetrier::new(
            provider,
            FallbackChain::new(["m1", "m2"]),
            RetryPolicy {
                max_key_attempts: 2,
                attempt_delay: Duration::ZERO,
            },
        );
        ChunkTranslator::new(
            Arc::new(retrier),
            ChunkSettings {
                max_chunk_chars: 2000,
                chunk_delay,
                target_language: "French".to_string(),
            },
        )
    }

    /// Echo the chunk back in upper case, failing for chunks containing `fail_marker`
    fn upper_echo(fail_marker: Option<char>) -> ScriptedProvider {
        ScriptedProvider::new(retryable(500)).respond_with(move |_, _, prompt| {
            let content = prompt.last_content();
            let start = content.find("Text:\n")? + "Text:\n".len();
            let end = content.find("\n\nTranslation (")?;
            let chunk = &content[start..end];
            if fail_marker.map(|m| chunk.contains(m)).unwrap_or(false) {
                return None;
            }
            Some(InvokeOutcome::Success(chunk.to_uppercase()))
        })
    }

    #[test]
    fn test_five_thousand_chars_make_three_chunks() {
        let paragraphs: Vec<String> = [800, 800, 800, 800, 800, 990]
            .iter()
            .map(|&n| paragraph('x', n))
            .collect();
        let text = paragraphs.join("\n\n");
        assert_eq!(text.chars().count(), 5000);

        let chunks = split_into_chunks(&text, 2000);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 2000));
    }

    #[test]
    fn test_chunks_respect_limit_unless_paragraph_is_longer() {
        let sizes = [[10, 300, 45, 999, 7], [2500, 12, 12, 1990, 3000], [1, 1, 1, 1, 1]];
        for (round, lens) in sizes.iter().enumerate() {
            for max in [20, 100, 1000, 2000] {
                let paragraphs: Vec<String> = lens
                    .iter()
                    .enumerate()
                    .map(|(i, &n)| paragraph((b'a' + (i + round) as u8) as char, n))
                    .collect();
                let text = paragraphs.join("\n  \n\n");

                let chunks = split_into_chunks(&text, max);
                for chunk in &chunks {
                    let len = chunk.chars().count();
                    let single_paragraph = !chunk.contains(CHUNK_SEPARATOR);
                    assert!(len <= max || single_paragraph, "chunk of {} over {}", len, max);
                }
                // no paragraph lost, none split
                assert_eq!(reassemble(&chunks), paragraphs.join(CHUNK_SEPARATOR));
            }
        }
    }

    #[test]
    fn test_oversized_paragraph_kept_whole() {
        let long = paragraph('z', 2500);
        let text = format!("short\n\n{}\n\ntail", long);
        let chunks = split_into_chunks(&text, 2000);
        assert_eq!(chunks, vec!["short".to_string(), long, "tail".to_string()]);
    }

    #[test]
    fn test_multibyte_counts_characters() {
        let text = format!("{}\n\n{}", paragraph('é', 6), paragraph('ü', 6));
        assert_eq!(split_into_chunks(&text, 14).len(), 1);
        assert_eq!(split_into_chunks(&text, 13).len(), 2);
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(split_into_chunks("", 100).is_empty());
        assert!(split_into_chunks(" \n\n \n", 100).is_empty());
    }

    #[tokio::test]
    async fn test_translates_every_chunk_in_order() {
        let provider = Arc::new(upper_echo(None));
        let translator = translator(provider.clone(), Duration::ZERO);
        let text = format!("{}\n\n{}\n\n{}", paragraph('a', 1500), paragraph('b', 1500), "c");

        let report = translator.translate(&text, "m1", &pool()).await.unwrap();

        assert_eq!(report.total_chunks, 2);
        assert!(report.is_complete());
        assert_eq!(
            report.text,
            format!("{}\n\n{}\n\n{}", paragraph('A', 1500), paragraph('B', 1500), "C")
        );

        let first = &provider.calls()[0];
        assert!(first.prompt.last_content().contains("part 1 of 2"));
        assert!(first.prompt.last_content().contains("to French"));
    }

    #[tokio::test]
    async fn test_failed_chunk_keeps_original_in_place() {
        let provider = Arc::new(upper_echo(Some('b')));
        let translator = translator(provider.clone(), Duration::ZERO);
        let text = [paragraph('a', 1900), paragraph('b', 1900), paragraph('c', 1900)].join("\n\n");

        let report = translator.translate(&text, "m1", &pool()).await.unwrap();

        assert_eq!(report.total_chunks, 3);
        assert_eq!(report.translated_chunks, 2);
        let parts: Vec<&str> = report.text.split(CHUNK_SEPARATOR).collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], paragraph('A', 1900));
        assert_eq!(parts[1], paragraph('b', 1900));
        assert_eq!(parts[2], paragraph('C', 1900));
        // 1 + (2 models x 2 keys) + 1
        assert_eq!(provider.calls().len(), 6);
    }

    #[tokio::test]
    async fn test_empty_pool_is_reported() {
        let translator = translator(Arc::new(upper_echo(None)), Duration::ZERO);
        let empty = KeyPool::new("translate", Vec::new());

        let err = translator.translate("hello", "m1", &empty).await.unwrap_err();
        assert!(matches!(err, RelayError::PoolExhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_chunks_only() {
        let mut done = Vec::new();
        let translator = translator(Arc::new(upper_echo(None)), Duration::from_secs(1));
        let text = [paragraph('a', 1900), paragraph('b', 1900), paragraph('c', 1900)].join("\n\n");

        let start = tokio::time::Instant::now();
        let report = translator
            .translate_with_progress(&text, "m1", &pool(), |i, n| done.push((i, n)))
            .await
            .unwrap();

        assert_eq!(report.total_chunks, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(done, vec![(1, 3), (2, 3), (3, 3)]);
    }
}
