//! Repository Context
//!
//! An authenticated client paired with the project it operates on

use crate::config::RepoTarget;
use crate::error::{Error, Result};
use crate::gitlab::{GitLabClient, Project};
use crate::resolver::ProjectResolver;

/// Connected Repository
pub struct Repo {
    /// Where the repository came from
    pub target: RepoTarget,

    /// Client bound to the repository's instance
    pub client: GitLabClient,

    /// Resolved project
    pub project: Project,
}

impl Repo {
    /// Connect to a repository and resolve its project
    ///
    /// # Arguments
    /// - `target`: Validated repository target
    /// - `accept_invalid_certs`: Skip TLS certificate verification
    ///
    /// # Errors
    /// - If the client cannot be created
    /// - `ProjectNotFound` if the project path does not exist
    /// - Transport errors from the project search
    pub async fn connect(target: RepoTarget, accept_invalid_certs: bool) -> Result<Self> {
        target.validate()?;

        let client = GitLabClient::with_options(
            &target.instance_url(),
            &target.token,
            accept_invalid_certs,
        )?;

        let project = ProjectResolver::new(&client)
            .resolve_by_path(target.project_path())
            .await?;
        tracing::info!(
            path = %project.path_with_namespace,
            id = project.id,
            "connected to repository"
        );

        Ok(Self {
            target,
            client,
            project,
        })
    }

    /// Check that the token is accepted by the instance
    ///
    /// # Errors
    /// Returns the API error when authentication fails
    pub async fn check_auth(&self) -> Result<()> {
        let user = self.client.current_user().await.map_err(|e| match e {
            Error::GitLabApi { status: 401, .. } => {
                Error::config_validation(format!("Token rejected by {}", self.target.url))
            }
            other => other,
        })?;
        tracing::debug!(user = %user.username, "authenticated");
        Ok(())
    }
}
