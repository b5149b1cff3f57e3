/// Normalises Uzbek phone numbers to `+998XXXXXXXXX` where the digits allow it.
pub fn normalize_uz_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return String::new();
    }

    if digits.len() == 9 {
        return format!("+998{}", digits);
    }
    format!("+{}", digits)
}

/// The stored forms a phone may appear in: with and without the leading `+`.
pub fn phone_variants(raw: &str) -> Vec<String> {
    let normalized = normalize_uz_phone(raw);
    if normalized.is_empty() {
        return Vec::new();
    }
    let bare = normalized.trim_start_matches('+').to_string();
    vec![normalized, bare]
}
