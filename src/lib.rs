//! # gl-labeler
//!
//! Bulk label management for GitLab projects
//!
//! ## Features
//! - Rename and recolor labels by regular expression
//! - Delete labels by regular expression
//! - Copy labels between projects
//! - Copy the instance's global labels into a project
//! - Resolve `group/repo` paths to projects

pub mod config;
pub mod error;
pub mod gitlab;
pub mod labels;
pub mod repo;
pub mod resolver;

pub use config::{AppConfig, RepoConfig, RepoTarget};
pub use error::{Error, Result};
pub use gitlab::{GitLabClient, Label, LabelService, Project};
pub use labels::{BatchOperation, BatchReport, LabelEngine};
pub use repo::Repo;
pub use resolver::ProjectResolver;

/// Rename labels of a repository by pattern
///
/// Resolves `path` on the instance at `base_url` and applies
/// [`LabelEngine::update_by_pattern`] to it.
///
/// # Examples
///
/// ```rust,no_run
/// use gl_labeler::update_repository_labels;
///
/// #[tokio::main]
/// async fn main() -> gl_labeler::Result<()> {
///     let report = update_repository_labels(
///         "https://gitlab.com",
///         "your_gitlab_token",
///         "group/repo",
///         "(.+):(.+)",
///         "${1}/${2}",
///     )
///     .await?;
///
///     println!("Updated {} labels", report.succeeded.len());
///     Ok(())
/// }
/// ```
pub async fn update_repository_labels(
    base_url: &str,
    token: &str,
    path: &str,
    pattern: &str,
    replacement: &str,
) -> Result<BatchReport> {
    let base_url = url::Url::parse(base_url).map_err(|source| Error::InvalidUrl {
        url: base_url.to_string(),
        source,
    })?;
    let client = GitLabClient::new(&base_url, token)?;
    let project = ProjectResolver::new(&client).resolve_by_path(path).await?;

    LabelEngine::new(&client)
        .update_by_pattern(project.id, pattern, replacement, None)
        .await
}
