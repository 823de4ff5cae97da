use quill_core::QuillError;
use tracing::info;

/// Environment variable holding the GitHub token.
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";

/// Publishes generated results as pull request conversation comments.
///
/// Repositories are addressed by numeric id, which is what CI workflows
/// expose as `github.event.repository.id`.
pub struct CommentPoster {
    octocrab: octocrab::Octocrab,
}

impl CommentPoster {
    /// Create a poster from an explicit token or the `GITHUB_TOKEN` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Config`] if no token is available, or
    /// [`QuillError::GitHub`] if the client cannot be built.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use quill_generate::github::CommentPoster;
    ///
    /// let poster = CommentPoster::new(Some("ghp_xxxx")).unwrap();
    /// ```
    pub fn new(token: Option<&str>) -> Result<Self, QuillError> {
        let token = match token {
            Some(t) => t.to_string(),
            None => std::env::var(ENV_GITHUB_TOKEN)
                .ok()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| QuillError::Config(format!("{ENV_GITHUB_TOKEN} is not set")))?,
        };

        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token)
            .build()
            .map_err(|e| QuillError::GitHub(format!("failed to create GitHub client: {e}")))?;

        Ok(Self { octocrab })
    }

    /// Post `body` as a comment on pull request `pull_request_id` and return the comment id.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::GitHub`] on API errors.
    pub async fn post_comment(
        &self,
        repository_id: u64,
        pull_request_id: u64,
        body: &str,
    ) -> Result<u64, QuillError> {
        let route = comment_route(repository_id, pull_request_id);
        let payload = serde_json::json!({ "body": body });

        let response: serde_json::Value = self
            .octocrab
            .post(route, Some(&payload))
            .await
            .map_err(|e| QuillError::GitHub(format!("failed to post comment: {e}")))?;

        let id = response
            .get("id")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| QuillError::GitHub(format!("unexpected response: {response}")))?;
        info!(repository_id, pull_request_id, comment_id = id, "comment posted");
        Ok(id)
    }
}

/// API route for creating a conversation comment on an issue or pull request.
///
/// # Examples
///
/// ```
/// use quill_generate::github::comment_route;
///
/// assert_eq!(comment_route(1296269, 42), "/repositories/1296269/issues/42/comments");
/// ```
pub fn comment_route(repository_id: u64, pull_request_id: u64) -> String {
    format!("/repositories/{repository_id}/issues/{pull_request_id}/comments")
}
