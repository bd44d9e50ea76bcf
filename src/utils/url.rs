//! URL utilities for consistent endpoint construction.

/// Normalize a base URL by removing trailing slashes.
///
/// # Examples
///
/// ```
/// use mentora_chat::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.mentora.app/v1/"), "https://api.mentora.app/v1");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path without producing double slashes.
///
/// # Examples
///
/// ```
/// use mentora_chat::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.mentora.app/v1/", "/chat/send"),
///     "https://api.mentora.app/v1/chat/send"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_any_number_of_trailing_slashes() {
        assert_eq!(normalize_base_url("https://api.mentora.app/v1"), "https://api.mentora.app/v1");
        assert_eq!(normalize_base_url("https://api.mentora.app/v1///"), "https://api.mentora.app/v1");
        assert_eq!(normalize_base_url(""), "");
    }

    #[test]
    fn construct_handles_slash_combinations() {
        for base in ["https://api.mentora.app/v1", "https://api.mentora.app/v1/"] {
            for endpoint in ["chat/history", "/chat/history"] {
                assert_eq!(
                    construct_api_url(base, endpoint),
                    "https://api.mentora.app/v1/chat/history"
                );
            }
        }
    }
}
