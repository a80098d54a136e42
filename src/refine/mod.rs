pub mod openai;
pub mod prompts;

use async_trait::async_trait;

pub use openai::OpenAiRefiner;
pub use prompts::PromptSet;

/// Text-refinement service as seen by the pipeline.
///
/// `None` means the service could not produce usable text after its retries;
/// the caller treats that as a failure of the current item only.
#[async_trait]
pub trait Refiner: Send + Sync {
    async fn refine_title(&self, original_title: &str) -> Option<String>;

    /// `refined_title` is the already refined title, given as context.
    async fn refine_description(
        &self,
        original_description: &str,
        refined_title: &str,
    ) -> Option<String>;
}

/// Trim whitespace and any quotes the model wrapped its answer in.
pub fn clean_output(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_matches(|c: char| c == '"' || c == '\'').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
