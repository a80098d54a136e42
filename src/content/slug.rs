use std::sync::LazyLock;

use regex::Regex;

static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\-]").unwrap());
static HYPHEN_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());

/// Turn a product title into a URL path segment.
///
/// Order matters: umlauts are transliterated before the character filter,
/// otherwise they would be dropped as non-ASCII.
pub fn slugify(title: &str) -> String {
    let slug = title.to_lowercase().replace(' ', "-");
    let slug = slug
        .replace('ä', "ae")
        .replace('ö', "oe")
        .replace('ü', "ue")
        .replace('ß', "ss");
    let slug = DISALLOWED.replace_all(&slug, "");
    let slug = HYPHEN_RUNS.replace_all(&slug, "-");
    slug.trim_matches('-').to_string()
}
