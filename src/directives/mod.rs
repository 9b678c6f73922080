//! In-band directive blocks (`[[CREATE_TODO]]` + `key: value` lines) found
//! in assistant replies, turned into typed [`Action`]s.

pub mod domains;
pub mod parser;
pub mod schedule;
pub mod types;

pub use domains::{LifeDomain, normalize_domain};
pub use parser::{extract_actions, extract_actions_at, remove_directives};
pub use types::{
    Action, ActionKind, ChildItem, GoalData, LifeDirectionData, Priority, ProjectData, TaskData,
    TimeBlockData, TodoData, TodoGroupData,
};
