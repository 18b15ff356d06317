//! Log redaction helpers (spec §4.2). Applied to every URL, header map,
//! or address before it reaches a `tracing` call site.

const REDACTED: &str = "***";

/// Query-parameter names treated as secrets regardless of the provider's
/// own `apiKeyEnvVar` name.
const GENERIC_SECRET_PARAMS: &[&str] = &["apikey", "api_key", "token"];

/// Redact a URL's query string: any parameter named in
/// `GENERIC_SECRET_PARAMS`, or matching `extra_param_names` (typically the
/// provider's own API-key query parameter name, case-insensitive), has its
/// value replaced with `***`.
pub fn redact_url(url: &str, extra_param_names: &[&str]) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let redacted_query: Vec<String> = query
        .split('&')
        .map(|pair| {
            let Some((key, _value)) = pair.split_once('=') else {
                return pair.to_string();
            };
            let key_lower = key.to_ascii_lowercase();
            let is_secret = GENERIC_SECRET_PARAMS.contains(&key_lower.as_str())
                || extra_param_names
                    .iter()
                    .any(|p| p.to_ascii_lowercase() == key_lower);
            if is_secret {
                format!("{key}={REDACTED}")
            } else {
                pair.to_string()
            }
        })
        .collect();

    format!("{base}?{}", redacted_query.join("&"))
}

/// Redact an `Authorization` header value, keeping only the scheme
/// (`Bearer`, `Basic`, ...) so logs can show what kind of credential was
/// sent without leaking it.
pub fn redact_authorization(value: &str) -> String {
    match value.split_once(' ') {
        Some((scheme, _)) => format!("{scheme} {REDACTED}"),
        None => REDACTED.to_string(),
    }
}

/// Mask an address to `head4…tail4` for structured logs (spec §4.2).
pub fn redact_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 8 {
        return REDACTED.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
