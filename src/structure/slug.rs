//! Module slug and title normalization

use std::sync::OnceLock;

use regex::Regex;

use crate::store::UserId;

const FALLBACK_SLUG: &str = "module";

fn separators() -> &'static Regex {
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();
    SEPARATORS.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static pattern"))
}

fn whitespace() -> &'static Regex {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"))
}

/// Lowercase, dash-separated ASCII slug
pub fn slugify(input: &str) -> String {
    let lowered = input.trim().to_lowercase();
    separators()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// Auto slug for a module title, prefixed with the owner when scoped
pub fn module_slug(title: &str, owner: Option<UserId>) -> String {
    let base = match slugify(title) {
        slug if slug.is_empty() => FALLBACK_SLUG.to_string(),
        slug => slug,
    };
    match owner {
        Some(owner) => format!("{}-{}", owner, base),
        None => base,
    }
}

/// Title comparison key: trimmed, lowercase, single spaces
pub fn normalize_title(title: &str) -> String {
    whitespace()
        .replace_all(title.trim(), " ")
        .to_lowercase()
}
