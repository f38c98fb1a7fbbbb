//! Research project catalogue returned by the backend.

use serde::{Deserialize, Serialize};

use super::batch::ProjectId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "projectId")]
    pub id: ProjectId,
    pub project_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: String,
}

/// `projects` arrives as a Java-typed list: `["java.util.ArrayList", [ ... ]]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectResponse {
    projects: Vec<ProjectArrayItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ProjectArrayItem {
    TypeTag(#[allow(dead_code)] String),
    Projects(Vec<Project>),
}

impl ProjectResponse {
    pub fn into_projects(self) -> Vec<Project> {
        self.projects
            .into_iter()
            .find_map(|item| match item {
                ProjectArrayItem::Projects(projects) => Some(projects),
                ProjectArrayItem::TypeTag(_) => None,
            })
            .unwrap_or_default()
    }
}
