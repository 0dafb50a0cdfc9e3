use std::future::Future;

use typst_mcp_registry::RegistryError;

pub const README_CANDIDATES: &[&str] = &["README.md", "readme.md", "Readme.md"];
pub const LICENSE_CANDIDATES: &[&str] = &["LICENSE", "LICENSE.md", "LICENSE.txt"];
pub const CHANGELOG_CANDIDATES: &[&str] = &["CHANGELOG.md", "CHANGELOG", "changelog.md", "HISTORY.md"];

/// Tries `candidates` in order and returns the first one `fetch` yields
/// content for, together with its name. Only fatal registry errors abort the
/// search.
pub async fn first_match<F, Fut>(
    candidates: &[&'static str],
    mut fetch: F,
) -> Result<Option<(&'static str, String)>, RegistryError>
where
    F: FnMut(&'static str) -> Fut,
    Fut: Future<Output = Result<Option<String>, RegistryError>>,
{
    for &candidate in candidates {
        match fetch(candidate).await {
            Ok(Some(content)) => return Ok(Some((candidate, content))),
            Ok(None) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => tracing::debug!("candidate {candidate} unavailable: {err}"),
        }
    }
    Ok(None)
}
