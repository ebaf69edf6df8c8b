//! Model name normalization.
//!
//! Record types are registered and looked up by a normalized name, so the
//! schema bridge and the registry must agree on one rule: CamelCase words are
//! split with underscores, `-` and spaces become underscores, and the result is
//! lowercased.

/// Normalizes a type name: `OrderItem` -> `order_item`, `HTTPLog` -> `http_log`.
pub fn normalize_model_name(name: &str) -> String {
    let chars: Vec<char> = name.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch == '-' || ch == ' ' || ch == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }

        if ch.is_uppercase() && i > 0 && !out.ends_with('_') {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                out.push('_');
            }
        }

        out.extend(ch.to_lowercase());
    }

    while out.ends_with('_') {
        out.pop();
    }
    out
}
