//! Project Resolution
//!
//! Turns a `group/repo` path into the GitLab project it names

use crate::error::{Error, Result};
use crate::gitlab::{LabelService, Project};

/// Normalize a project path for lookup
///
/// Strips a leading slash and a trailing `.git`.
pub fn normalize_project_path(path: &str) -> &str {
    let path = path.strip_suffix(".git").unwrap_or(path);
    path.strip_prefix('/').unwrap_or(path)
}

/// Project Resolver
///
/// Finds a project by its full path using the project search API
pub struct ProjectResolver<'a, S: LabelService + ?Sized> {
    service: &'a S,
}

impl<'a, S: LabelService + ?Sized> ProjectResolver<'a, S> {
    /// Create a resolver on top of a GitLab service
    pub fn new(service: &'a S) -> Self {
        Self { service }
    }

    /// Resolve a `group/repo` path into a project
    ///
    /// Searches by the last path segment and scans result pages in the
    /// order GitLab returns them, stopping at the first project whose
    /// `path_with_namespace` equals the normalized path exactly.
    ///
    /// # Errors
    /// - `InvalidRepositoryFormat` if the path has no namespace
    /// - `ProjectNotFound` if no page contains the project
    /// - Any transport error from a page fetch, unchanged
    pub async fn resolve_by_path(&self, path: &str) -> Result<Project> {
        let path = normalize_project_path(path);
        let query = match path.rsplit_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() => name,
            _ => return Err(Error::InvalidRepositoryFormat(path.to_string())),
        };

        let mut page = 1;
        loop {
            let results = self.service.search_projects(query, page).await?;
            if let Some(project) = results
                .items
                .iter()
                .find(|project| project.path_with_namespace == path)
            {
                tracing::debug!(path, id = project.id, page, "resolved project");
                return Ok(project.clone());
            }

            match results.next() {
                Some(next) => page = next,
                None => break,
            }
        }

        Err(Error::ProjectNotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_project_path() {
        assert_eq!(normalize_project_path("group/repo"), "group/repo");
        assert_eq!(normalize_project_path("/group/repo"), "group/repo");
        assert_eq!(normalize_project_path("group/repo.git"), "group/repo");
        assert_eq!(normalize_project_path("/group/sub/repo.git"), "group/sub/repo");
    }

    #[test]
    fn test_normalize_keeps_inner_git() {
        assert_eq!(normalize_project_path("group/repo.github"), "group/repo.github");
    }
}
