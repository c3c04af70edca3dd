use crate::error::{PipelineError, Result};

use super::models::RepoCoordinates;

fn strip_scheme(url: &str) -> &str {
    let url = url.trim();
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url)
}

/// Key used to match a repository URL coming from a webhook against the URL
/// stored on a course. Scheme, `.git` suffix and trailing slashes are ignored;
/// owner/repo casing is kept.
pub fn comparison_key(url: &str) -> String {
    let mut key = strip_scheme(url).trim_end_matches('/');
    while let Some(stripped) = key.strip_suffix(".git") {
        key = stripped.trim_end_matches('/');
    }
    key.to_string()
}

/// Extract owner and repo from a GitHub URL such as
/// `https://github.com/owner/repo.git`.
pub fn parse_repo_url(url: &str) -> Result<RepoCoordinates> {
    let key = comparison_key(url);
    let path = key.strip_prefix("github.com/").unwrap_or(&key);

    let mut parts = path.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(owner), Some(repo)) => Ok(RepoCoordinates {
            owner: owner.to_string(),
            repo: repo.to_string(),
        }),
        _ => Err(PipelineError::validation(format!(
            "invalid GitHub repository URL: {url}"
        ))),
    }
}
