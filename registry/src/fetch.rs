//! HTTP fetches with a hard cap on response size.

use std::time::Duration;
use std::time::Instant;

use reqwest::Client;
use reqwest::StatusCode;
use reqwest::redirect::Policy;

use crate::error::RegistryError;
use crate::error::Result;
use crate::url_guard::BlockReason;
use crate::url_guard::check_redirect;

/// Cap for a single file.
pub const MAX_FILE_BYTES: u64 = 1024 * 1024;
/// Cap for a directory listing.
pub const MAX_LISTING_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    Follow,
    TooMany,
    Rejected(BlockReason),
}

/// Decides one redirect hop. `previous` counts the URLs already visited.
pub fn redirect_decision(target: &str, previous: usize, max_redirects: usize) -> RedirectDecision {
    if previous >= max_redirects {
        return RedirectDecision::TooMany;
    }
    match check_redirect(target) {
        Ok(()) => RedirectDecision::Follow,
        Err(reason) => {
            tracing::warn!("blocked redirect to {target}: {reason}");
            RedirectDecision::Rejected(reason)
        }
    }
}

/// Carried through reqwest so a policy rejection can be told apart from any
/// other redirect failure.
#[derive(Debug)]
struct RejectedRedirect(BlockReason);

impl std::fmt::Display for RejectedRedirect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for RejectedRedirect {}

/// Redirect policy that only follows trusted registry hosts, at most
/// `max_redirects` hops.
pub fn redirect_policy(max_redirects: usize) -> Policy {
    Policy::custom(move |attempt| {
        match redirect_decision(attempt.url().as_str(), attempt.previous().len(), max_redirects) {
            RedirectDecision::Follow => attempt.follow(),
            RedirectDecision::TooMany => attempt.error("too many redirects"),
            RedirectDecision::Rejected(reason) => attempt.error(RejectedRedirect(reason)),
        }
    })
}

/// GETs `url`, failing with [`RegistryError::SizeExceeded`] once more than
/// `max_bytes` would be materialized.
///
/// A HEAD probe runs first; when it advertises an oversized body the GET is
/// never sent. The probe is only a hint, so the declared length of the real
/// response and the bytes actually received are checked as well.
pub async fn fetch(client: &Client, url: &str, max_bytes: u64) -> Result<BoundedResponse> {
    let start = Instant::now();
    let too_large = |actual| RegistryError::SizeExceeded {
        url: url.to_string(),
        limit: max_bytes,
        actual,
    };

    match client.head(url).send().await {
        Ok(probe) if probe.status().is_success() => {
            if let Some(len) = probe.content_length()
                && len > max_bytes
            {
                tracing::warn!("{url} advertises {len} bytes, over the {max_bytes} byte limit");
                return Err(too_large(Some(len)));
            }
        }
        Ok(_) => {}
        Err(err) => tracing::debug!("size probe for {url} failed: {err}"),
    }

    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|err| map_reqwest_error(url, err, start.elapsed()))?;
    let status = response.status();

    if let Some(len) = response.content_length()
        && len > max_bytes
    {
        tracing::warn!("{url} declares {len} bytes, over the {max_bytes} byte limit");
        return Err(too_large(Some(len)));
    }

    let mut body = Vec::new();
    let mut received: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| map_reqwest_error(url, err, start.elapsed()))?
    {
        received += chunk.len() as u64;
        if received > max_bytes {
            tracing::warn!("{url} sent more than {max_bytes} bytes; aborting");
            return Err(too_large(Some(received)));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(BoundedResponse { status, body })
}

fn rejected_redirect(err: &reqwest::Error) -> Option<&BlockReason> {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(rejected) = inner.downcast_ref::<RejectedRedirect>() {
            return Some(&rejected.0);
        }
        source = inner.source();
    }
    None
}

pub(crate) fn map_reqwest_error(url: &str, err: reqwest::Error, elapsed: Duration) -> RegistryError {
    if let Some(rule) = rejected_redirect(&err) {
        return RegistryError::SecurityRejected {
            url: url.to_string(),
            rule: rule.clone(),
        };
    }
    if err.is_timeout() {
        return RegistryError::Timeout {
            url: url.to_string(),
            elapsed,
        };
    }
    RegistryError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}
