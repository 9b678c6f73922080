use super::domains::LifeDomain;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Directive tag as it appears between `[[` and `]]`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, EnumIter, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    CreateGoal,
    CreateProject,
    CreateTask,
    CreateTimeBlock,
    CreateTodo,
    CreateTodoGroup,
    UpdateLifeDirection,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, AsRefStr, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// Sub-list entry (project task, todo-group item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildItem {
    pub id: String,
    pub title: String,
    pub completed: bool,
}

impl ChildItem {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            completed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalData {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub domain: LifeDomain,
    pub target_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectData {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub domain: LifeDomain,
    /// Title of the goal this project serves, when named.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub tasks: Vec<ChildItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub domain: LifeDomain,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBlockData {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub domain: LifeDomain,
    /// Local wall-clock start; always before `end`.
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoData {
    pub title: String,
    pub tab: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoGroupData {
    pub title: String,
    pub tab: String,
    #[serde(default)]
    pub items: Vec<ChildItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifeDirectionData {
    pub text: String,
}

/// Typed domain action carried by an assistant reply. Wire form is
/// `{"type": "createTodo", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Action {
    CreateGoal(GoalData),
    CreateProject(ProjectData),
    CreateTask(TaskData),
    CreateTimeBlock(TimeBlockData),
    CreateTodo(TodoData),
    CreateTodoGroup(TodoGroupData),
    UpdateLifeDirection(LifeDirectionData),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CreateGoal(_) => ActionKind::CreateGoal,
            Self::CreateProject(_) => ActionKind::CreateProject,
            Self::CreateTask(_) => ActionKind::CreateTask,
            Self::CreateTimeBlock(_) => ActionKind::CreateTimeBlock,
            Self::CreateTodo(_) => ActionKind::CreateTodo,
            Self::CreateTodoGroup(_) => ActionKind::CreateTodoGroup,
            Self::UpdateLifeDirection(_) => ActionKind::UpdateLifeDirection,
        }
    }

    /// Human-readable label for logs and CLI output.
    pub fn summary(&self) -> String {
        match self {
            Self::CreateGoal(data) => format!("goal \"{}\" by {}", data.title, data.target_date),
            Self::CreateProject(data) => format!(
                "project \"{}\" ({} tasks) due {}",
                data.title,
                data.tasks.len(),
                data.due_date
            ),
            Self::CreateTask(data) => format!("task \"{}\" [{}]", data.title, data.priority),
            Self::CreateTimeBlock(data) => format!(
                "time block \"{}\" {} - {}",
                data.title,
                data.start.format("%Y-%m-%d %H:%M"),
                data.end.format("%H:%M")
            ),
            Self::CreateTodo(data) => format!("todo \"{}\" ({})", data.title, data.tab),
            Self::CreateTodoGroup(data) => format!(
                "todo group \"{}\" ({} items, {})",
                data.title,
                data.items.len(),
                data.tab
            ),
            Self::UpdateLifeDirection(_) => "life direction update".to_string(),
        }
    }
}

/// Decode server-supplied actions, dropping entries that do not fit a known
/// shape.
pub fn decode_actions(raw: &[serde_json::Value]) -> Vec<Action> {
    raw.iter()
        .filter_map(|value| match serde_json::from_value::<Action>(value.clone()) {
            Ok(action) => Some(action),
            Err(error) => {
                tracing::debug!("dropping undecodable server action: {error}");
                None
            }
        })
        .collect()
}
