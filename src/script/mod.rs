
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info};

use crate::llm::TextGenerator;
use crate::{BriefcastError, Result};

/// One article feeding the script, reduced to its summary.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub title: String,
    pub url: String,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct ScriptRequest {
    /// Tone of the narration, e.g. "informative" or "conversational".
    pub style: String,
    pub target_duration_minutes: u32,
    pub include_intro_conclusion: bool,
    /// Whether the narration should name its sources.
    pub source_attribution: bool,
}

impl Default for ScriptRequest {
    fn default() -> Self {
        Self {
            style: "informative".to_string(),
            target_duration_minutes: 1,
            include_intro_conclusion: true,
            source_attribution: false,
        }
    }
}

/// Turns article summaries into a narration script with a hard word budget.
pub struct ScriptGenerator {
    generator: Arc<dyn TextGenerator>,
    words_per_minute: usize,
}

impl ScriptGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, words_per_minute: usize) -> Self {
        Self {
            generator,
            words_per_minute: words_per_minute.max(1),
        }
    }

    /// Generate a script capped at `duration × words_per_minute` words. A
    /// zero-minute request short-circuits to an empty script without touching
    /// the backend. Backend output over budget is truncated at a word
    /// boundary, never mid-word.
    pub async fn generate(
        &self,
        sources: &[ScriptSource],
        request: &ScriptRequest,
    ) -> Result<String> {
        let max_words = request.target_duration_minutes as usize * self.words_per_minute;
        if max_words == 0 {
            debug!("zero-duration script requested, skipping generation");
            return Ok(String::new());
        }
        if sources.is_empty() {
            return Err(BriefcastError::Generation(
                "no summaries available to build a script from".to_string(),
            ));
        }

        let prompt = build_prompt(sources, request, max_words);
        let generator = Arc::clone(&self.generator);
        let raw = tokio::task::spawn_blocking(move || generator.generate(&prompt))
            .await
            .map_err(|e| BriefcastError::Generation(format!("generation task panicked: {e}")))??;

        let script = truncate_to_word_limit(&raw, max_words);
        info!(
            "generated {}-word script from {} source(s)",
            script.split_whitespace().count(),
            sources.len()
        );
        Ok(script)
    }
}

fn build_prompt(sources: &[ScriptSource], request: &ScriptRequest, max_words: usize) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are Sophia, a podcast narrator. Write a {} podcast narration script \
         covering the news summaries below.",
        request.style
    );
    let _ = writeln!(
        prompt,
        "The script must be at most {max_words} words (about {} minute(s) of narration). \
         Keep it factual and insightful; do not invent details that are not in the summaries.",
        request.target_duration_minutes
    );

    if request.include_intro_conclusion {
        prompt.push_str("Open with a brief introduction and close with a short conclusion.\n");
    } else {
        prompt.push_str("Do not add an introduction or conclusion; cover the stories directly.\n");
    }
    if request.source_attribution {
        prompt.push_str("Attribute each story to its source by name.\n");
    }

    prompt.push_str("\nSummaries:\n");
    for (i, source) in sources.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{}. {} ({})\n{}",
            i + 1,
            source.title,
            source.url,
            source.summary
        );
    }

    prompt.push_str("\nRespond with the narration text only.\n");
    prompt
}

/// Cut `text` to at most `max_words` whole words.
fn truncate_to_word_limit(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.trim().to_string();
    }
    words[..max_words].join(" ")
}
