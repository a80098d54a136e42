use serde::Deserialize;

use crate::config::Variant;

const CLASSIC_TITLE_SYSTEM: &str = "You are an SEO expert specializing in e-commerce product titles for a German tire shop.
Your task is to refine product titles to be:
- SEO-friendly and keyword-optimized
- Clear and descriptive
- Professional and engaging
- Concise (under 70 characters when possible)
- In German language

Return ONLY the refined title, nothing else.";

const CLASSIC_TITLE_TASK: &str = "Refine this product title for better SEO: {title}";

const CLASSIC_DESCRIPTION_SYSTEM: &str = "You are an SEO expert specializing in e-commerce meta descriptions for a German tire shop.
Your task is to create SEO-optimized og_descriptions that:
- Are compelling and encourage clicks
- Include relevant keywords naturally
- Are between 150-160 characters
- Are in German language
- Highlight key product features

Return ONLY the refined description, nothing else.";

const CLASSIC_DESCRIPTION_TASK: &str = "Create an SEO-optimized og_description for this tire product.
Product title: {title}
Current description: {description}";

const FOCUS_TITLE_SYSTEM: &str = "You write product titles for a German online tire shop.
Rules:
- Start with the brand and model, then the tire size and load/speed index
- Keep the season (Sommerreifen, Winterreifen, Ganzjahresreifen) as a keyword
- At most 60 characters
- German language, no marketing superlatives, no quotes, no markup

Return only the title.";

const FOCUS_TITLE_TASK: &str = "Current product title: {title}
Write the improved title.";

const FOCUS_DESCRIPTION_SYSTEM: &str = "You write meta descriptions for a German online tire shop.
Rules:
- 140 to 155 characters
- Mention the product title's main keyword once, near the start
- Name one concrete benefit (grip, mileage, noise, fuel efficiency)
- German language, plain text, no quotes, no markup

Return only the description.";

const FOCUS_DESCRIPTION_TASK: &str = "Product title: {title}
Current meta description: {description}
Write the improved meta description.";

/// System and task prompts for both refinement calls.
///
/// Task prompts are templates: `{title}` and `{description}` are substituted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PromptSet {
    pub title_system: String,
    pub title_task: String,
    pub description_system: String,
    pub description_task: String,
}

impl PromptSet {
    pub fn for_variant(variant: Variant) -> Self {
        let (ts, tt, ds, dt) = match variant {
            Variant::Classic => (
                CLASSIC_TITLE_SYSTEM,
                CLASSIC_TITLE_TASK,
                CLASSIC_DESCRIPTION_SYSTEM,
                CLASSIC_DESCRIPTION_TASK,
            ),
            Variant::Focus => (
                FOCUS_TITLE_SYSTEM,
                FOCUS_TITLE_TASK,
                FOCUS_DESCRIPTION_SYSTEM,
                FOCUS_DESCRIPTION_TASK,
            ),
        };
        Self {
            title_system: ts.to_string(),
            title_task: tt.to_string(),
            description_system: ds.to_string(),
            description_task: dt.to_string(),
        }
    }

    pub fn title_prompt(&self, title: &str) -> String {
        self.title_task.replace("{title}", title)
    }

    pub fn description_prompt(&self, description: &str, refined_title: &str) -> String {
        self.description_task
            .replace("{description}", description)
            .replace("{title}", refined_title)
    }
}
