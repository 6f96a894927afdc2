use std::time::Duration;

pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    build_http_client_with_timeout(None)
}

/// Build the shared reqwest client.
///
/// System proxy discovery is opt-in through `AIKA_ENABLE_SYSTEM_PROXY`; some
/// platforms panic inside discovery, so a failed attempt falls back to
/// `no_proxy`.
pub fn build_http_client_with_timeout(
    timeout: Option<Duration>,
) -> Result<reqwest::Client, reqwest::Error> {
    let allow_system_proxy = std::env::var("AIKA_ENABLE_SYSTEM_PROXY")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if allow_system_proxy {
        match std::panic::catch_unwind(|| attempt_build(timeout, false)) {
            Ok(Ok(client)) => return Ok(client),
            Ok(Err(error)) => {
                tracing::warn!(
                    "HTTP client with system proxy discovery failed ({}); retrying with no_proxy",
                    error
                );
            }
            Err(_) => {
                tracing::warn!(
                    "HTTP client system proxy discovery panicked; retrying with no_proxy"
                );
            }
        }
    }

    attempt_build(timeout, true)
}

fn attempt_build(
    timeout: Option<Duration>,
    no_proxy: bool,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if no_proxy {
        builder = builder.no_proxy();
    }
    builder.build()
}
