//! User-Agent string installed on every transport client.

/// Project URL for User-Agent identification (RFC 9308).
const PROJECT_UA_URL: &str = "https://github.com/fierce/native-transfer";

/// Default User-Agent for request, download and upload traffic.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("native-transfer/{version} (+{PROJECT_UA_URL})")
}
