use url::Url;

use crate::services::telegram_service::ChatTarget;

pub fn normalize_group_link(raw: &str) -> String {
    let value = raw.trim();
    if value.is_empty() {
        return String::new();
    }
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return value.to_string();
    }
    if value.starts_with("t.me/") || value.starts_with("telegram.me/") {
        return format!("https://{}", value);
    }
    if let Some(name) = value.strip_prefix('@') {
        return format!("https://t.me/{}", name);
    }
    value.to_string()
}

/// Public links (`t.me/<name>`) resolve to `@name`. Private invite links carry no
/// chat identity and resolve to nothing.
pub fn chat_target_from_link(link: &str) -> Option<ChatTarget> {
    let normalized = normalize_group_link(link);
    if normalized.is_empty() {
        return None;
    }
    let url = Url::parse(&normalized).ok()?;
    let first = url.path_segments()?.find(|s| !s.is_empty())?;
    if first.starts_with('+') || first == "joinchat" {
        return None;
    }
    Some(ChatTarget::Username(format!("@{}", first)))
}

pub fn is_private_invite_link(link: &str) -> bool {
    let normalized = normalize_group_link(link);
    let Ok(url) = Url::parse(&normalized) else { return false };
    let host_ok = matches!(url.host_str(), Some("t.me") | Some("telegram.me"));
    let path = url.path().trim_start_matches('/');
    let hash = path
        .strip_prefix('+')
        .or_else(|| path.strip_prefix("joinchat/"));
    host_ok
        && hash
            .map(|h| h.len() >= 8 && h.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_public_links_to_usernames() {
        let expected = Some(ChatTarget::Username("@medgroup".to_string()));
        assert_eq!(chat_target_from_link("https://t.me/medgroup"), expected);
        assert_eq!(chat_target_from_link("t.me/medgroup"), expected);
        assert_eq!(chat_target_from_link("@medgroup"), expected);
    }

    #[test]
    fn private_links_have_no_target() {
        assert_eq!(chat_target_from_link("https://t.me/+AbCdEfGh123"), None);
        assert_eq!(chat_target_from_link("https://t.me/joinchat/AbCdEfGh123"), None);
        assert_eq!(chat_target_from_link(""), None);
        assert!(is_private_invite_link("https://t.me/+AbCdEfGh123"));
        assert!(!is_private_invite_link("https://t.me/medgroup"));
    }
}
