//! URL utilities for consistent URL handling
//!
//! This module provides utilities for normalizing URLs to prevent issues
//! with trailing slashes when constructing backend endpoints.

/// Normalize a base URL by removing trailing slashes
///
/// This ensures consistent URL construction when appending endpoints,
/// preventing double slashes in the final URLs.
///
/// # Examples
///
/// ```
/// use virtualis::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://hospital.example.com"), "https://hospital.example.com");
/// assert_eq!(normalize_base_url("https://hospital.example.com/"), "https://hospital.example.com");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Construct a complete endpoint URL from a base URL and endpoint path
///
/// This function normalizes the base URL and safely appends the endpoint,
/// ensuring there are no double slashes in the result.
///
/// # Examples
///
/// ```
/// use virtualis::utils::url::construct_endpoint_url;
///
/// assert_eq!(
///     construct_endpoint_url("https://hospital.example.com", "rest/v1/patients"),
///     "https://hospital.example.com/rest/v1/patients"
/// );
/// assert_eq!(
///     construct_endpoint_url("https://hospital.example.com/", "/rest/v1/patients"),
///     "https://hospital.example.com/rest/v1/patients"
/// );
/// ```
pub fn construct_endpoint_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("https://hospital.example.com"),
            "https://hospital.example.com"
        );
        assert_eq!(
            normalize_base_url("https://hospital.example.com/"),
            "https://hospital.example.com"
        );
        assert_eq!(
            normalize_base_url("https://hospital.example.com///"),
            "https://hospital.example.com"
        );
        assert_eq!(normalize_base_url(""), "");
        assert_eq!(normalize_base_url("///"), "");
    }

    #[test]
    fn test_construct_endpoint_url() {
        assert_eq!(
            construct_endpoint_url("https://hospital.example.com", "functions/v1/alis-chat"),
            "https://hospital.example.com/functions/v1/alis-chat"
        );
        assert_eq!(
            construct_endpoint_url("https://hospital.example.com/", "functions/v1/alis-chat"),
            "https://hospital.example.com/functions/v1/alis-chat"
        );
        assert_eq!(
            construct_endpoint_url("https://hospital.example.com", "/rest/v1/staged_orders"),
            "https://hospital.example.com/rest/v1/staged_orders"
        );
        assert_eq!(
            construct_endpoint_url("https://hospital.example.com///", "rest/v1/patients"),
            "https://hospital.example.com/rest/v1/patients"
        );
    }
}
