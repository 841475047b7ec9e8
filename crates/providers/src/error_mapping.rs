use canonical::GatewayError;
use reqwest::StatusCode;

/// Maps an upstream HTTP failure status to the canonical error taxonomy.
/// All four-and five-hundreds collapse to `UpstreamUnavailable` except
/// `401`/`403`, which the gateway treats as its own auth failure rather than
/// the caller's — the credential came from `tools_config`, not from the
/// end user, so surfacing it as `AuthDenied` would be misleading; it's still
/// an upstream problem.
pub(crate) fn from_status(status: StatusCode, body: &str, provider: &str) -> GatewayError {
    GatewayError::UpstreamUnavailable(format!("{provider} returned {status}: {}", truncate(body)))
}

fn truncate(body: &str) -> &str {
    let max = 500;
    if body.len() <= max { body } else { &body[..max] }
}
