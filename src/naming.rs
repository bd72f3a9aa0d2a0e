//! Person naming rules.
//!
//! A person created without an operator-supplied name gets a placeholder of
//! the form `"<prefix> <short id>"`, where the short id is the first eight hex
//! characters of the new person's UUID. Stores walk [`placeholder_candidates`]
//! inside the creating transaction and take the first name nobody holds.

use crate::models::NewPersonName;

pub const DEFAULT_PLACEHOLDER_PREFIX: &str = "Unknown";

/// Normalize an optional custom name: whitespace-only means "no name".
pub fn normalize_custom_name(custom_name: Option<&str>) -> NewPersonName {
    match custom_name.map(str::trim) {
        Some(name) if !name.is_empty() => NewPersonName::Custom(name.to_string()),
        _ => NewPersonName::Placeholder,
    }
}

/// Candidate placeholder names for a new person, shortest first.
///
/// Yields the 8- and 12-character id prefixes, the full simple id, and then
/// the full id with a numeric suffix (`-2`, `-3`, ...) without end.
pub fn placeholder_candidates<'a>(
    prefix: &'a str,
    person_id: &str,
) -> impl Iterator<Item = String> + 'a {
    let simple: String = person_id.chars().filter(|c| *c != '-').collect();
    let short = |n: usize| simple.chars().take(n).collect::<String>();

    let mut fixed = vec![short(8), short(12), simple.clone()];
    fixed.dedup();

    let suffixed = (2u64..).map(move |n| format!("{}-{}", simple, n));
    fixed
        .into_iter()
        .chain(suffixed)
        .map(move |id| format!("{} {}", prefix, id))
}

/// First candidate for `person_id` not rejected by `is_taken`.
pub fn pick_placeholder(prefix: &str, person_id: &str, is_taken: impl Fn(&str) -> bool) -> String {
    placeholder_candidates(prefix, person_id)
        .find(|name| !is_taken(name))
        .unwrap_or_else(|| format!("{} {}", prefix, person_id))
}
