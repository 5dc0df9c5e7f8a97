//! Property extraction from item display names.
//!
//! Matching and exclusion rules compare items by a value derived from their
//! names: a color family, a shared name prefix, or the word following a
//! keyword. All functions here are pure.

use crate::models::MatchProperty;

/// Color words recognised by [`extract_property`] for the literal `"color"` property.
pub const COLOR_WORDS: [&str; 24] = [
    "red", "blue", "green", "yellow", "orange", "purple", "pink", "brown", "black", "white",
    "gray", "grey", "gold", "silver", "cyan", "magenta", "violet", "indigo", "teal", "navy",
    "maroon", "beige", "turquoise", "lime",
];

/// Canonical color families and their synonyms, checked in order.
pub const COLOR_FAMILIES: [(&str, &[&str]); 12] = [
    ("red", &["red", "crimson", "scarlet", "ruby", "maroon", "cherry", "burgundy"]),
    ("blue", &["blue", "navy", "azure", "cobalt", "cerulean", "sapphire", "indigo"]),
    ("green", &["green", "emerald", "lime", "olive", "jade", "mint", "forest"]),
    ("yellow", &["yellow", "gold", "golden", "amber", "lemon", "mustard"]),
    ("orange", &["orange", "tangerine", "peach", "coral", "rust"]),
    ("purple", &["purple", "violet", "lavender", "lilac", "plum", "magenta", "amethyst"]),
    ("pink", &["pink", "rose", "fuchsia", "salmon", "blush"]),
    ("brown", &["brown", "tan", "chocolate", "bronze", "beige", "coffee", "caramel"]),
    ("black", &["black", "onyx", "ebony", "jet", "charcoal"]),
    ("white", &["white", "ivory", "snow", "pearl", "cream"]),
    ("gray", &["gray", "grey", "silver", "ash", "slate", "steel"]),
    ("cyan", &["cyan", "teal", "turquoise", "aqua"]),
];

/// Shortest token considered by the substring fallback of [`color_family_from_name`].
const MIN_FUZZY_TOKEN_LEN: usize = 3;

/// Splits a name on whitespace, hyphens, and underscores into lowercase words.
#[must_use]
pub fn tokenize(name: &str) -> Vec<String> {
    name.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Derives a comparable value from an item name.
///
/// - `"color"`: the first known color word, else the first token.
/// - anything else: the token after the first token containing `property`,
///   else the first token.
///
/// Returns an empty string for names without tokens.
#[must_use]
pub fn extract_property(item_name: &str, property: &str) -> String {
    let tokens = tokenize(item_name);
    let Some(first) = tokens.first() else {
        return String::new();
    };
    let property = property.to_lowercase();

    if property == "color" {
        return tokens
            .iter()
            .find(|token| COLOR_WORDS.contains(&token.as_str()))
            .unwrap_or(first)
            .clone();
    }

    tokens
        .iter()
        .position(|token| token.contains(&property))
        .and_then(|index| tokens.get(index + 1))
        .unwrap_or(first)
        .clone()
}

/// Maps a name to its canonical color family.
///
/// Exact synonym matches win; otherwise a token and a synonym that contain one
/// another count as a match. Returns `None` when nothing matches.
#[must_use]
pub fn color_family_from_name(name: &str) -> Option<&'static str> {
    let tokens = tokenize(name);

    for token in &tokens {
        for (family, synonyms) in COLOR_FAMILIES {
            if synonyms.contains(&token.as_str()) {
                return Some(family);
            }
        }
    }

    for token in tokens.iter().filter(|t| t.len() >= MIN_FUZZY_TOKEN_LEN) {
        for (family, synonyms) in COLOR_FAMILIES {
            if synonyms
                .iter()
                .any(|synonym| token.contains(synonym) || synonym.contains(token.as_str()))
            {
                return Some(family);
            }
        }
    }

    None
}

/// Lowercased text before the first dash or underscore (the whole name if none).
#[must_use]
pub fn name_prefix(name: &str) -> Option<String> {
    let prefix = name
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    (!prefix.is_empty()).then_some(prefix)
}

/// Derives the value a rule compares for the given property.
#[must_use]
pub fn derive_value(name: &str, property: &MatchProperty) -> Option<String> {
    match property {
        MatchProperty::Color => color_family_from_name(name).map(str::to_string),
        MatchProperty::NamePrefix => name_prefix(name),
        MatchProperty::Keyword(keyword) => {
            let value = extract_property(name, keyword);
            (!value.is_empty()).then_some(value)
        }
    }
}

/// Case-insensitive comparison of two derived values.
#[must_use]
pub fn values_match(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Whether two item names share a property value.
///
/// Names without a derivable value never match.
#[must_use]
pub fn names_share_property(a: &str, b: &str, property: &MatchProperty) -> bool {
    match (derive_value(a, property), derive_value(b, property)) {
        (Some(left), Some(right)) => values_match(&left, &right),
        _ => false,
    }
}
