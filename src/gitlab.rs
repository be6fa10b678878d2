//! GitLab API Client
//!
//! The set of GitLab operations the label engine relies on, and its
//! implementation over the GitLab REST API v4

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Path of the REST API below the instance URL
pub const API_PATH: &str = "/api/v4/";

/// Upper bound for every API request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const PER_PAGE: u32 = 100;

/// Highest page a listing loop will request
///
/// GitLab leaves out `X-Total-Pages` for very large result sets, so this
/// bounds listings whose last page is unknown.
pub const MAX_PAGES: u32 = 10_000;

/// Identifier assigned to a project by the GitLab instance
pub type ProjectId = u64;

/// Encode a string for use in URL path segments (RFC 3986 with UTF-8 support)
///
/// Only unreserved characters (A-Z, a-z, 0-9, -, ., _, ~) are left unencoded.
fn encode_path_segment(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '.' | '_' | '~' => c.to_string(),
            _ => c
                .to_string()
                .bytes()
                .map(|b| format!("%{:02X}", b))
                .collect::<String>(),
        })
        .collect()
}

/// GitLab Project
///
/// The subset of project fields the engine reads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    /// Project ID
    pub id: ProjectId,

    /// Project name
    pub name: String,

    /// Full path including namespace (e.g. `group/repo`)
    pub path_with_namespace: String,

    /// Project description
    #[serde(default)]
    pub description: Option<String>,
}

/// GitLab Label
///
/// Represents label information retrieved from the GitLab API. The usage
/// counters are maintained by GitLab and never written by this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    /// Label ID
    #[serde(default)]
    pub id: u64,

    /// Label name, unique within a project
    pub name: String,

    /// Label color (e.g. `#ff0000`)
    #[serde(default)]
    pub color: String,

    /// Label description
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub open_issues_count: u64,

    #[serde(default)]
    pub closed_issues_count: u64,

    #[serde(default)]
    pub open_merge_requests_count: u64,
}

impl Label {
    /// Whether two labels have the same name and color, ignoring counters
    pub fn same_definition(&self, other: &Label) -> bool {
        self.name == other.name && self.color == other.color
    }
}

/// Payload for creating a label
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewLabel {
    pub name: String,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Changes applied to an existing label
///
/// `None` fields are left untouched by GitLab.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LabelUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Project visibility level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Internal,
    Public,
}

/// Payload for creating a project
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreateProjectOptions {
    pub name: String,
    pub description: String,
    pub issues_enabled: bool,
    pub merge_requests_enabled: bool,
    pub wiki_enabled: bool,
    pub snippets_enabled: bool,
    pub visibility: Visibility,
}

impl CreateProjectOptions {
    /// A private project with every optional feature disabled
    pub fn minimal<N: Into<String>, D: Into<String>>(name: N, description: D) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            issues_enabled: false,
            merge_requests_enabled: false,
            wiki_enabled: false,
            snippets_enabled: false,
            visibility: Visibility::Private,
        }
    }
}

/// Authenticated user
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
}

/// One page of a paginated listing
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in the order returned by GitLab
    pub items: Vec<T>,

    /// Number of the requested page (1-based)
    pub page: u32,

    /// Next page reported by GitLab, if any
    pub next_page: Option<u32>,

    /// Last page reported by GitLab, if known
    pub last_page: Option<u32>,
}

impl<T> Page<T> {
    /// Page to fetch after this one
    ///
    /// Only moves forward, never past the reported last page and never past
    /// [`MAX_PAGES`] when no last page is reported. `page` is the page that
    /// was requested, so a listing loop terminates whatever numbers the
    /// server sends.
    pub fn next(&self) -> Option<u32> {
        let next = self.next_page?;
        if next <= self.page || next > MAX_PAGES {
            return None;
        }
        match self.last_page {
            Some(last) if next > last => None,
            _ => Some(next),
        }
    }
}

/// GitLab operations used by the resolver and the label engine
#[async_trait]
pub trait LabelService: Send + Sync {
    /// List one page of a project's labels
    async fn list_labels(&self, project: ProjectId, page: u32) -> Result<Page<Label>>;

    /// Create a label in a project
    async fn create_label(&self, project: ProjectId, label: &NewLabel) -> Result<Label>;

    /// Update the label called `name`
    async fn update_label(
        &self,
        project: ProjectId,
        name: &str,
        update: &LabelUpdate,
    ) -> Result<Label>;

    /// Delete the label called `name`
    async fn delete_label(&self, project: ProjectId, name: &str) -> Result<()>;

    /// Search projects by name, one page at a time
    async fn search_projects(&self, query: &str, page: u32) -> Result<Page<Project>>;

    /// Create a project
    async fn create_project(&self, options: &CreateProjectOptions) -> Result<Project>;

    /// Delete a project
    async fn delete_project(&self, project: ProjectId) -> Result<()>;
}

/// GitLab API Client
///
/// Talks to one GitLab instance with a private token
#[derive(Debug, Clone)]
pub struct GitLabClient {
    http: Client,
    api: Url,
    token: String,
}

impl GitLabClient {
    /// Create a new GitLab client
    ///
    /// # Arguments
    /// - `base_url`: Instance URL (e.g. `https://gitlab.com`)
    /// - `token`: Private or personal access token
    ///
    /// # Errors
    /// Returns an error if the API URL cannot be built or the HTTP client fails to initialize
    pub fn new(base_url: &Url, token: &str) -> Result<Self> {
        Self::with_options(base_url, token, false)
    }

    /// Create a new GitLab client, optionally skipping TLS certificate checks
    pub fn with_options(base_url: &Url, token: &str, accept_invalid_certs: bool) -> Result<Self> {
        let api = api_url(base_url)?;
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self {
            http,
            api,
            token: token.to_string(),
        })
    }

    /// Get the user the token belongs to
    ///
    /// # Errors
    /// Returns an error if the token is rejected or the instance is unreachable
    pub async fn current_user(&self) -> Result<User> {
        let url = self.endpoint("user")?;
        let response = self.send(self.http.get(url)).await?;
        Ok(response.json().await?)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api.join(path).map_err(|source| Error::InvalidUrl {
            url: format!("{}{}", self.api, path),
            source,
        })
    }

    /// Request for a single label
    ///
    /// `.` and `..` cannot travel as a path segment since URL parsing folds
    /// them (even percent-encoded), so those names go to the labels
    /// collection with a `name` parameter.
    fn label_request(
        &self,
        method: Method,
        project: ProjectId,
        name: &str,
    ) -> Result<RequestBuilder> {
        if is_dot_segment(name) {
            let url = self.endpoint(&format!("projects/{}/labels", project))?;
            return Ok(self.http.request(method, url).query(&[("name", name)]));
        }

        let url = self.endpoint(&format!(
            "projects/{}/labels/{}",
            project,
            encode_path_segment(name)
        ))?;
        Ok(self.http.request(method, url))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::GitLabApi {
            status: status.as_u16(),
            message: api_error_message(status, &body),
        })
    }

    async fn get_page<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
        page: u32,
    ) -> Result<Page<T>> {
        let request = self
            .http
            .get(url)
            .query(query)
            .query(&[("page", page), ("per_page", PER_PAGE)]);
        let response = self.send(request).await?;

        let headers = response.headers();
        let next_page = header_page(headers, "x-next-page");
        let last_page = header_page(headers, "x-total-pages");
        let items = response.json::<Vec<T>>().await?;

        Ok(Page {
            items,
            page,
            next_page,
            last_page,
        })
    }
}

#[async_trait]
impl LabelService for GitLabClient {
    async fn list_labels(&self, project: ProjectId, page: u32) -> Result<Page<Label>> {
        tracing::debug!(project, page, "listing labels");
        let url = self.endpoint(&format!("projects/{}/labels", project))?;
        self.get_page(url, &[], page).await
    }

    async fn create_label(&self, project: ProjectId, label: &NewLabel) -> Result<Label> {
        tracing::debug!(project, name = %label.name, "creating label");
        let url = self.endpoint(&format!("projects/{}/labels", project))?;
        let response = self.send(self.http.post(url).json(label)).await?;
        Ok(response.json().await?)
    }

    async fn update_label(
        &self,
        project: ProjectId,
        name: &str,
        update: &LabelUpdate,
    ) -> Result<Label> {
        tracing::debug!(project, name, ?update, "updating label");
        let request = self.label_request(Method::PUT, project, name)?;
        let response = self.send(request.json(update)).await?;
        Ok(response.json().await?)
    }

    async fn delete_label(&self, project: ProjectId, name: &str) -> Result<()> {
        tracing::debug!(project, name, "deleting label");
        let request = self.label_request(Method::DELETE, project, name)?;
        self.send(request).await?;
        Ok(())
    }

    async fn search_projects(&self, query: &str, page: u32) -> Result<Page<Project>> {
        tracing::debug!(query, page, "searching projects");
        let url = self.endpoint("projects")?;
        self.get_page(url, &[("search", query), ("simple", "true")], page)
            .await
    }

    async fn create_project(&self, options: &CreateProjectOptions) -> Result<Project> {
        tracing::debug!(name = %options.name, "creating project");
        let url = self.endpoint("projects")?;
        let response = self.send(self.http.post(url).json(options)).await?;
        Ok(response.json().await?)
    }

    async fn delete_project(&self, project: ProjectId) -> Result<()> {
        tracing::debug!(project, "deleting project");
        let url = self.endpoint(&format!("projects/{}", project))?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}

/// Build the API root from an instance URL, keeping any relative path
/// the instance is served under
fn api_url(base_url: &Url) -> Result<Url> {
    let mut base = base_url.clone();
    base.set_query(None);
    base.set_fragment(None);
    let raw = format!("{}{}", base.as_str().trim_end_matches('/'), API_PATH);
    Url::parse(&raw).map_err(|source| Error::InvalidUrl { url: raw, source })
}

fn is_dot_segment(name: &str) -> bool {
    matches!(name, "." | "..")
}

fn header_page(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Extract GitLab's error message from a response body
///
/// GitLab answers with `{"message": ...}` or `{"error": ...}`, where
/// `message` can also be an object of field validation errors.
fn api_error_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ApiErrorBody {
        message: Option<serde_json::Value>,
        error: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) {
        match (parsed.message, parsed.error) {
            (Some(serde_json::Value::String(message)), _) => return message,
            (Some(other), _) => return other.to_string(),
            (None, Some(error)) => return error,
            (None, None) => {}
        }
    }

    let body = body.trim();
    if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    } else {
        body.to_string()
    }
}
