use serde::Deserialize;

/// Label for rows where a justification was expected but none was given.
pub const UNSPECIFIED: &str = "Não Especificado";
/// Label for justifications no configured keyword matched.
pub const OTHERS: &str = "Outros";

/// Ordered keyword-to-category mapping. Order matters: the first category
/// with a matching keyword wins, so the UI sends an array, not an object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryConfig {
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    pub name: String,
    pub keywords: Vec<String>,
}

/// Classifies a free-text justification. Matching is case-insensitive
/// substring containment. Missing or blank text is distinguished from text
/// that simply matched nothing.
pub fn classify_justification(text: Option<&str>, config: &CategoryConfig) -> String {
    let Some(raw) = text else {
        return UNSPECIFIED.to_string();
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return UNSPECIFIED.to_string();
    }

    let lower = trimmed.to_lowercase();
    for category in &config.categories {
        let hit = category
            .keywords
            .iter()
            .any(|k| !k.trim().is_empty() && lower.contains(&k.trim().to_lowercase()));
        if hit {
            return display_label(&category.name);
        }
    }
    OTHERS.to_string()
}

// Legacy config files name categories like "motivo_saude"; the stored label
// drops the prefix and title-cases ("motivo_saude" -> "Saude").
fn display_label(name: &str) -> String {
    let stripped = name.strip_prefix("motivo_").unwrap_or(name).replace('_', " ");
    stripped
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
