/// Whether the refined pair is worth writing back.
///
/// Titles that differ only in letter case count as unchanged; descriptions
/// must match exactly.
pub fn has_material_change(
    original_title: &str,
    refined_title: &str,
    original_description: &str,
    refined_description: &str,
) -> bool {
    let title_changed = original_title.to_lowercase() != refined_title.to_lowercase();
    let description_changed = original_description != refined_description;
    title_changed || description_changed
}
