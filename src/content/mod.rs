pub mod change;
pub mod slug;

use crate::catalog::{MetaEntry, ProductPatch};

pub use change::has_material_change;
pub use slug::slugify;

/// Site-specific rules for turning refined text into platform fields.
#[derive(Debug, Clone)]
pub struct SeoPolicy {
    /// Appended to the refined title to form the SEO title.
    pub title_suffix: String,
    pub title_key: String,
    pub description_key: String,
    /// When set, the refined title is also written as the focus keyword.
    pub focus_keyword_key: Option<String>,
}

impl SeoPolicy {
    pub fn seo_title(&self, refined_title: &str) -> String {
        format!("{}{}", refined_title, self.title_suffix)
    }
}

/// Refined fields for one product.
#[derive(Debug, Clone, PartialEq)]
pub struct RefinedContent {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub seo_title: String,
}

impl RefinedContent {
    pub fn new(title: String, slug: String, description: String, policy: &SeoPolicy) -> Self {
        let seo_title = policy.seo_title(&title);
        Self {
            title,
            slug,
            description,
            seo_title,
        }
    }

    pub fn to_patch(&self, policy: &SeoPolicy) -> ProductPatch {
        let mut meta_data = vec![
            MetaEntry::new(&policy.title_key, &self.seo_title),
            MetaEntry::new(&policy.description_key, &self.description),
        ];
        if let Some(key) = &policy.focus_keyword_key {
            meta_data.push(MetaEntry::new(key, &self.title));
        }
        ProductPatch {
            name: self.title.clone(),
            slug: self.slug.clone(),
            meta_data,
        }
    }
}
