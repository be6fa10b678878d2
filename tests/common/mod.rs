//! In-memory GitLab used by the integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use gl_labeler::gitlab::{
    CreateProjectOptions, Label, LabelService, LabelUpdate, NewLabel, Page, Project, ProjectId,
};
use gl_labeler::{Error, Result};

/// Namespace of projects created through the API
pub const USER_NAMESPACE: &str = "root";

struct FakeProject {
    project: Project,
    labels: Vec<Label>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    next_label_id: u64,
    projects: BTreeMap<ProjectId, FakeProject>,
    global_labels: Vec<(String, String)>,
    page_size: usize,
    fail_create: HashSet<String>,
    fail_update: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_create_project: bool,
    fail_delete_project: bool,
    fail_search_page: Option<u32>,
    calls: Vec<String>,
}

/// In-memory GitLab instance
pub struct FakeGitLab {
    state: Mutex<State>,
}

impl Default for FakeGitLab {
    fn default() -> Self {
        Self::new()
    }
}

fn api_error(status: u16, message: &str) -> Error {
    Error::GitLabApi {
        status,
        message: message.to_string(),
    }
}

fn paginate<T: Clone>(items: &[T], page: u32, page_size: usize) -> Page<T> {
    let total_pages = items.len().div_ceil(page_size).max(1) as u32;
    let start = (page.saturating_sub(1) as usize) * page_size;
    let items = items.iter().skip(start).take(page_size).cloned().collect();

    Page {
        items,
        page,
        next_page: (page < total_pages).then_some(page + 1),
        last_page: Some(total_pages),
    }
}

impl FakeGitLab {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1,
                next_label_id: 1,
                page_size: 20,
                ..State::default()
            }),
        }
    }

    /// Number of items per listed page
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.state.lock().unwrap().page_size = page_size;
        self
    }

    /// Labels every new project is seeded with
    pub fn with_global_labels(self, labels: &[(&str, &str)]) -> Self {
        self.state.lock().unwrap().global_labels = labels
            .iter()
            .map(|(name, color)| (name.to_string(), color.to_string()))
            .collect();
        self
    }

    /// Add a project without labels
    pub fn add_project(&self, path: &str) -> Project {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;

        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        let project = Project {
            id,
            name,
            path_with_namespace: path.to_string(),
            description: None,
        };
        state.projects.insert(
            id,
            FakeProject {
                project: project.clone(),
                labels: Vec::new(),
            },
        );
        project
    }

    /// Add a label directly, bypassing the API
    pub fn add_label(&self, project: ProjectId, name: &str, color: &str) {
        self.add_label_with_description(project, name, color, None);
    }

    pub fn add_label_with_description(
        &self,
        project: ProjectId,
        name: &str,
        color: &str,
        description: Option<&str>,
    ) {
        let mut state = self.state.lock().unwrap();
        let id = state.next_label_id;
        state.next_label_id += 1;
        state
            .projects
            .get_mut(&project)
            .expect("unknown project")
            .labels
            .push(Label {
                id,
                name: name.to_string(),
                color: color.to_string(),
                description: description.map(str::to_string),
                open_issues_count: 3,
                closed_issues_count: 1,
                open_merge_requests_count: 0,
            });
    }

    /// `(name, color)` of a project's labels, in creation order
    pub fn labels(&self, project: ProjectId) -> Vec<(String, String)> {
        self.full_labels(project)
            .into_iter()
            .map(|label| (label.name, label.color))
            .collect()
    }

    pub fn full_labels(&self, project: ProjectId) -> Vec<Label> {
        let state = self.state.lock().unwrap();
        state
            .projects
            .get(&project)
            .map(|p| p.labels.clone())
            .unwrap_or_default()
    }

    pub fn project_paths(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .projects
            .values()
            .map(|p| p.project.path_with_namespace.clone())
            .collect()
    }

    pub fn fail_create_label(&self, name: &str) {
        self.state.lock().unwrap().fail_create.insert(name.to_string());
    }

    pub fn fail_update_label(&self, name: &str) {
        self.state.lock().unwrap().fail_update.insert(name.to_string());
    }

    pub fn fail_delete_label(&self, name: &str) {
        self.state.lock().unwrap().fail_delete.insert(name.to_string());
    }

    pub fn fail_create_project(&self) {
        self.state.lock().unwrap().fail_create_project = true;
    }

    pub fn fail_delete_project(&self) {
        self.state.lock().unwrap().fail_delete_project = true;
    }

    pub fn fail_search_page(&self, page: u32) {
        self.state.lock().unwrap().fail_search_page = Some(page);
    }

    /// API calls made so far, e.g. `update_label(1, bug)`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(&format!("{}(", operation)))
            .count()
    }

    fn record(state: &mut State, call: String) {
        state.calls.push(call);
    }
}

#[async_trait]
impl LabelService for FakeGitLab {
    async fn list_labels(&self, project: ProjectId, page: u32) -> Result<Page<Label>> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("list_labels({}, {})", project, page));
        let page_size = state.page_size;
        let project = state
            .projects
            .get(&project)
            .ok_or_else(|| api_error(404, "404 Project Not Found"))?;
        Ok(paginate(&project.labels, page, page_size))
    }

    async fn create_label(&self, project: ProjectId, label: &NewLabel) -> Result<Label> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("create_label({}, {})", project, label.name));
        if state.fail_create.contains(&label.name) {
            return Err(api_error(500, "500 Internal Server Error"));
        }

        let id = state.next_label_id;
        state.next_label_id += 1;
        let project = state
            .projects
            .get_mut(&project)
            .ok_or_else(|| api_error(404, "404 Project Not Found"))?;
        if project.labels.iter().any(|l| l.name == label.name) {
            return Err(api_error(409, "Label already exists"));
        }

        let created = Label {
            id,
            name: label.name.clone(),
            color: label.color.clone(),
            description: label.description.clone(),
            open_issues_count: 0,
            closed_issues_count: 0,
            open_merge_requests_count: 0,
        };
        project.labels.push(created.clone());
        Ok(created)
    }

    async fn update_label(
        &self,
        project: ProjectId,
        name: &str,
        update: &LabelUpdate,
    ) -> Result<Label> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("update_label({}, {})", project, name));
        if state.fail_update.contains(name) {
            return Err(api_error(500, "500 Internal Server Error"));
        }

        let project = state
            .projects
            .get_mut(&project)
            .ok_or_else(|| api_error(404, "404 Project Not Found"))?;
        if let Some(new_name) = &update.new_name {
            if new_name != name && project.labels.iter().any(|l| &l.name == new_name) {
                return Err(api_error(409, "Label already exists"));
            }
        }

        let label = project
            .labels
            .iter_mut()
            .find(|l| l.name == name)
            .ok_or_else(|| api_error(404, "404 Label Not Found"))?;
        if let Some(new_name) = &update.new_name {
            label.name = new_name.clone();
        }
        if let Some(color) = &update.color {
            label.color = color.clone();
        }
        Ok(label.clone())
    }

    async fn delete_label(&self, project: ProjectId, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("delete_label({}, {})", project, name));
        if state.fail_delete.contains(name) {
            return Err(api_error(403, "403 Forbidden"));
        }

        let project = state
            .projects
            .get_mut(&project)
            .ok_or_else(|| api_error(404, "404 Project Not Found"))?;
        let before = project.labels.len();
        project.labels.retain(|l| l.name != name);
        if project.labels.len() == before {
            return Err(api_error(404, "404 Label Not Found"));
        }
        Ok(())
    }

    async fn search_projects(&self, query: &str, page: u32) -> Result<Page<Project>> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("search_projects({}, {})", query, page));
        if state.fail_search_page == Some(page) {
            return Err(api_error(502, "502 Bad Gateway"));
        }

        let query = query.to_lowercase();
        let matches: Vec<Project> = state
            .projects
            .values()
            .map(|p| p.project.clone())
            .filter(|p| p.name.to_lowercase().contains(&query))
            .collect();
        Ok(paginate(&matches, page, state.page_size))
    }

    async fn create_project(&self, options: &CreateProjectOptions) -> Result<Project> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("create_project({})", options.name));
        if state.fail_create_project {
            return Err(api_error(400, "name has already been taken"));
        }

        let id = state.next_id;
        state.next_id += 1;
        let project = Project {
            id,
            name: options.name.clone(),
            path_with_namespace: format!("{}/{}", USER_NAMESPACE, options.name),
            description: Some(options.description.clone()),
        };

        let mut labels = Vec::new();
        for (name, color) in state.global_labels.clone() {
            let label_id = state.next_label_id;
            state.next_label_id += 1;
            labels.push(Label {
                id: label_id,
                name,
                color,
                description: None,
                open_issues_count: 0,
                closed_issues_count: 0,
                open_merge_requests_count: 0,
            });
        }

        state.projects.insert(
            id,
            FakeProject {
                project: project.clone(),
                labels,
            },
        );
        Ok(project)
    }

    async fn delete_project(&self, project: ProjectId) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("delete_project({})", project));
        if state.fail_delete_project {
            return Err(api_error(403, "403 Forbidden"));
        }

        state
            .projects
            .remove(&project)
            .map(|_| ())
            .ok_or_else(|| api_error(404, "404 Project Not Found"))
    }
}
