//! Label Operations
//!
//! Pattern-based bulk updates and deletes, and label copies between
//! projects, including copies of the instance's global labels

use std::fmt;

use regex::Regex;

use crate::error::{Error, Result};
use crate::gitlab::{CreateProjectOptions, Label, LabelService, LabelUpdate, NewLabel, ProjectId};

/// Name prefix of the scratch project used to read global labels
pub const SCRATCH_PROJECT_PREFIX: &str = "temporary-copy-globals-from-";

/// Description of the scratch project used to read global labels
pub const SCRATCH_PROJECT_DESCRIPTION: &str = "Temporary repository to copy global labels from";

const SCRATCH_SUFFIX_LEN: usize = 4;

/// Kind of bulk label operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Update,
    Delete,
    Copy,
}

impl BatchOperation {
    fn verb(self) -> &'static str {
        match self {
            BatchOperation::Update => "update",
            BatchOperation::Delete => "delete",
            BatchOperation::Copy => "copy",
        }
    }

    fn action(self) -> &'static str {
        match self {
            BatchOperation::Update => "updating",
            BatchOperation::Delete => "deleting",
            BatchOperation::Copy => "create label",
        }
    }
}

/// A label the operation could not apply to
#[derive(Debug)]
pub struct LabelFailure {
    /// Name of the label as it was before the operation
    pub label: String,

    /// Underlying error
    pub cause: Error,
}

/// Outcome of a bulk label operation
#[derive(Debug)]
pub struct BatchReport {
    /// Operation performed
    pub operation: BatchOperation,

    /// Labels processed successfully, in scan order
    pub succeeded: Vec<String>,

    /// Labels that failed, in scan order
    pub failed: Vec<LabelFailure>,
}

impl BatchReport {
    /// Create a new empty report
    pub fn new(operation: BatchOperation) -> Self {
        Self {
            operation,
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Whether every processed label succeeded
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, label: &str, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.succeeded.push(label.to_string()),
            Err(cause) => {
                tracing::debug!(label, error = %cause, "{} failed", self.operation.action());
                self.failed.push(LabelFailure {
                    label: label.to_string(),
                    cause,
                });
            }
        }
    }

    /// Turn the report into an error when any label failed
    fn into_result(self) -> Result<Self> {
        tracing::info!(
            operation = self.operation.verb(),
            succeeded = self.succeeded.len(),
            failed = self.failed.len(),
            "label batch finished"
        );
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Batch(self))
        }
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to {} (some) labels with the following errors:",
            self.operation.verb()
        )?;
        for failure in &self.failed {
            write!(
                f,
                "\n{} '{}' failed: {}",
                self.operation.action(),
                failure.label,
                failure.cause
            )?;
        }
        Ok(())
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Generate a scratch project name with a random suffix
pub fn scratch_project_name() -> String {
    let suffix: String = (0..SCRATCH_SUFFIX_LEN)
        .map(|_| fastrand::alphanumeric().to_ascii_lowercase())
        .collect();
    format!("{}{}", SCRATCH_PROJECT_PREFIX, suffix)
}

/// Label Engine
///
/// Runs bulk label operations against a GitLab service, one API call at a time
pub struct LabelEngine<'a, S: LabelService + ?Sized> {
    service: &'a S,
}

impl<'a, S: LabelService + ?Sized> LabelEngine<'a, S> {
    /// Create an engine on top of a GitLab service
    pub fn new(service: &'a S) -> Self {
        Self { service }
    }

    /// Get all labels of a project, following pagination
    ///
    /// # Returns
    /// Labels in the order returned by GitLab
    pub async fn list_all_labels(&self, project: ProjectId) -> Result<Vec<Label>> {
        let mut labels = Vec::new();
        let mut page = 1;

        loop {
            let response = self.service.list_labels(project, page).await?;
            let next = response.next();
            labels.extend(response.items);

            match next {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(labels)
    }

    /// Update every label whose name matches `pattern`
    ///
    /// The pattern is searched anywhere in the name. A non-empty
    /// `replacement` renames the label, expanding `${1}`-style capture
    /// groups; an empty one keeps the name. An update request is sent for
    /// every match even when only the color changes.
    ///
    /// ```text
    /// pattern:     "(.+):(.+)"
    /// replacement: "${1}/${2}"     type:bug -> type/bug
    /// ```
    ///
    /// # Errors
    /// - `InvalidPattern` before any API call if the pattern is empty or invalid
    /// - `Batch` after the full scan if one or more updates failed
    pub async fn update_by_pattern(
        &self,
        project: ProjectId,
        pattern: &str,
        replacement: &str,
        color: Option<&str>,
    ) -> Result<BatchReport> {
        if pattern.is_empty() {
            return Err(Error::InvalidPattern {
                pattern: String::new(),
                source: regex::Error::Syntax("a match pattern is required".to_string()),
            });
        }
        let re = compile_pattern(pattern)?;
        let color = color.filter(|c| !c.is_empty()).map(str::to_string);

        let labels = self.list_all_labels(project).await?;
        let mut report = BatchReport::new(BatchOperation::Update);

        for label in labels.iter().filter(|label| re.is_match(&label.name)) {
            let new_name = if replacement.is_empty() {
                None
            } else {
                Some(re.replace_all(&label.name, replacement).into_owned())
            };
            let update = LabelUpdate {
                new_name,
                color: color.clone(),
            };

            let outcome = self
                .service
                .update_label(project, &label.name, &update)
                .await
                .map(|_| ());
            report.record(&label.name, outcome);
        }

        report.into_result()
    }

    /// Delete every label whose name matches `pattern`
    ///
    /// An empty pattern deletes all labels. Stops at the first failed
    /// delete; labels deleted before it stay deleted.
    ///
    /// # Errors
    /// - `InvalidPattern` before any API call if the pattern is invalid
    /// - The first delete error, unchanged
    pub async fn delete_by_pattern(&self, project: ProjectId, pattern: &str) -> Result<BatchReport> {
        let re = if pattern.is_empty() {
            None
        } else {
            Some(compile_pattern(pattern)?)
        };

        let labels = self.list_all_labels(project).await?;
        let mut report = BatchReport::new(BatchOperation::Delete);

        for label in labels {
            if re.as_ref().map_or(true, |re| re.is_match(&label.name)) {
                self.service.delete_label(project, &label.name).await?;
                report.succeeded.push(label.name);
            }
        }

        report.into_result()
    }

    /// Copy all labels of one project into another
    ///
    /// Only name and color are copied. Every label is attempted; the ones
    /// that could be created stay created.
    ///
    /// # Errors
    /// - Transport error if the source labels cannot be listed
    /// - `Batch` after the full scan if one or more creates failed
    pub async fn copy_labels(&self, from: ProjectId, to: ProjectId) -> Result<BatchReport> {
        let labels = self.list_all_labels(from).await?;
        let mut report = BatchReport::new(BatchOperation::Copy);

        for label in labels {
            let new_label = NewLabel {
                name: label.name,
                color: label.color,
                description: None,
            };
            let outcome = self
                .service
                .create_label(to, &new_label)
                .await
                .map(|_| ());
            report.record(&new_label.name, outcome);
        }

        report.into_result()
    }

    /// Copy the instance's global labels into a project
    ///
    /// GitLab has no API for global labels, but seeds every new project
    /// with them. A private scratch project is created, its labels are
    /// copied, and it is deleted again whether or not the copy succeeded.
    /// A failed delete is logged and does not change the result.
    ///
    /// # Errors
    /// - The create error if the scratch project cannot be created
    /// - Any error from [`LabelEngine::copy_labels`]
    pub async fn copy_global_labels_to(&self, target: ProjectId) -> Result<BatchReport> {
        let options =
            CreateProjectOptions::minimal(scratch_project_name(), SCRATCH_PROJECT_DESCRIPTION);
        let scratch = self.service.create_project(&options).await?;
        tracing::debug!(id = scratch.id, name = %scratch.name, "created scratch project");

        let result = self.copy_labels(scratch.id, target).await;

        if let Err(e) = self.service.delete_project(scratch.id).await {
            tracing::warn!(
                id = scratch.id,
                name = %scratch.path_with_namespace,
                error = %e,
                "failed to delete scratch project"
            );
        }

        result
    }
}
