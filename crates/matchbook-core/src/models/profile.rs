use serde::{Deserialize, Serialize};

use crate::models::{ProjectKey, SeekerKey};

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SeekerProfile {
    pub key: SeekerKey,
    pub display_name: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub work_style: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProjectProfile {
    pub key: ProjectKey,
    pub title: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub wanted_roles: Vec<String>,
}
