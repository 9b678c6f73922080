use super::domains::normalize_domain;
use super::schedule::{months_from, parse_date, parse_local_datetime, resolve_time_block};
use super::types::{
    Action, ActionKind, ChildItem, GoalData, LifeDirectionData, Priority, ProjectData, TaskData,
    TimeBlockData, TodoData, TodoGroupData,
};
use crate::error::DirectiveError;
use chrono::{Local, NaiveDateTime};
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;
use std::str::FromStr;
use std::sync::LazyLock;

const GOAL_DEFAULT_MONTHS: u32 = 3;
const PROJECT_DEFAULT_MONTHS: u32 = 1;
const DEFAULT_TODO_TAB: &str = "today";

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\[\[\s*(CREATE_GOAL|CREATE_PROJECT|CREATE_TASK|CREATE_TIME_BLOCK|CREATE_TODO_GROUP|CREATE_TODO|UPDATE_LIFE_DIRECTION)\s*\]\]",
    )
    .expect("directive marker regex")
});

static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+•–]|\d+[.)]|\[[ xX]?\])\s*").expect("bullet regex")
});

/// One recognised directive: its tag, the full span (marker through the end
/// of its body) and the body text.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DirectiveBlock<'a> {
    kind: ActionKind,
    span: Range<usize>,
    body: &'a str,
}

/// Locate every directive block. A block runs from its marker to the next
/// recognised marker or the end of the text, so blocks never overlap.
fn scan_blocks(text: &str) -> Vec<DirectiveBlock<'_>> {
    let markers: Vec<(ActionKind, Range<usize>)> = MARKER_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind = ActionKind::from_str(caps.get(1)?.as_str()).ok()?;
            Some((kind, whole.range()))
        })
        .collect();

    markers
        .iter()
        .enumerate()
        .map(|(index, (kind, marker))| {
            let end = markers
                .get(index + 1)
                .map_or(text.len(), |(_, next)| next.start);
            DirectiveBlock {
                kind: *kind,
                span: marker.start..end,
                body: &text[marker.end..end],
            }
        })
        .collect()
}

/// Extract typed actions from `response_text`, using the current local time
/// for date defaults. `None` when no valid directive is present.
pub fn extract_actions(response_text: &str) -> Option<Vec<Action>> {
    extract_actions_at(response_text, Local::now().naive_local())
}

/// [`extract_actions`] with an explicit local "now".
pub fn extract_actions_at(response_text: &str, now: NaiveDateTime) -> Option<Vec<Action>> {
    let actions: Vec<Action> = scan_blocks(response_text)
        .into_iter()
        .filter_map(|block| match build_action(&block, now) {
            Ok(action) => Some(action),
            Err(error) => {
                tracing::debug!("{error}");
                None
            }
        })
        .collect();

    if actions.is_empty() {
        None
    } else {
        Some(actions)
    }
}

/// Strip every recognised directive block for display. Text without markers
/// is returned untouched; otherwise the remainder is trimmed.
pub fn remove_directives(text: &str) -> String {
    let blocks = scan_blocks(text);
    if blocks.is_empty() {
        return text.to_string();
    }

    let mut visible = String::with_capacity(text.len());
    let mut cursor = 0;
    for block in &blocks {
        visible.push_str(&text[cursor..block.span.start]);
        cursor = block.span.end;
    }
    visible.push_str(&text[cursor..]);
    visible.trim().to_string()
}

// ── Field parsing ─────────────────────────────────────────────────

/// Case-insensitive `key: value` map built from a block body.
#[derive(Debug, Default)]
struct Fields {
    values: HashMap<String, String>,
}

impl Fields {
    fn parse(body: &str) -> Self {
        let mut values: HashMap<String, String> = HashMap::new();
        let mut current_key: Option<String> = None;

        for line in body.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if BULLET_RE.is_match(trimmed) {
                if let Some(key) = &current_key {
                    let entry = values.entry(key.clone()).or_default();
                    if !entry.is_empty() {
                        entry.push('\n');
                    }
                    entry.push_str(trimmed);
                }
                continue;
            }

            let Some((raw_key, raw_value)) = trimmed.split_once(':') else {
                continue;
            };
            let key = normalize_key(raw_key);
            if key.is_empty() {
                continue;
            }
            let value = raw_value.trim();
            if !value.is_empty() {
                values.insert(key.clone(), value.to_string());
            }
            current_key = Some(key);
        }

        Self { values }
    }

    fn get(&self, aliases: &[&str]) -> Option<&str> {
        aliases
            .iter()
            .find_map(|alias| self.values.get(*alias))
            .map(String::as_str)
    }

    fn get_owned(&self, aliases: &[&str]) -> Option<String> {
        self.get(aliases).map(str::to_string)
    }
}

fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn strip_bullet(item: &str) -> &str {
    match BULLET_RE.find(item) {
        Some(found) => item[found.end()..].trim(),
        None => item.trim(),
    }
}

/// Split a comma/newline-delimited list into fresh, incomplete children.
fn split_children(raw: Option<&str>) -> Vec<ChildItem> {
    raw.map(|value| {
        value
            .split(['\n', ','])
            .map(strip_bullet)
            .filter(|item| !item.is_empty())
            .map(ChildItem::new)
            .collect()
    })
    .unwrap_or_default()
}

// ── Action construction ───────────────────────────────────────────

const TITLE_KEYS: &[&str] = &["title", "name"];
const DESCRIPTION_KEYS: &[&str] = &["description", "details", "notes"];
const DOMAIN_KEYS: &[&str] = &["domain", "category", "area"];

fn build_action(block: &DirectiveBlock<'_>, now: NaiveDateTime) -> Result<Action, DirectiveError> {
    let fields = Fields::parse(block.body);
    let title = || {
        fields
            .get_owned(TITLE_KEYS)
            .ok_or_else(|| malformed(block.kind, "missing title"))
    };
    let description = fields.get_owned(DESCRIPTION_KEYS);
    let domain = fields.get(DOMAIN_KEYS).map(normalize_domain).unwrap_or_default();
    let today = now.date();

    let action = match block.kind {
        ActionKind::CreateGoal => Action::CreateGoal(GoalData {
            title: title()?,
            description,
            domain,
            target_date: fields
                .get(&["targetdate", "deadline", "date", "duedate"])
                .and_then(parse_date)
                .unwrap_or_else(|| months_from(today, GOAL_DEFAULT_MONTHS)),
        }),
        ActionKind::CreateProject => Action::CreateProject(ProjectData {
            title: title()?,
            description,
            domain,
            goal: fields.get_owned(&["goal", "goaltitle"]),
            due_date: fields
                .get(&["duedate", "deadline", "targetdate", "date"])
                .and_then(parse_date)
                .unwrap_or_else(|| months_from(today, PROJECT_DEFAULT_MONTHS)),
            tasks: split_children(fields.get(&["tasks", "steps"])),
        }),
        ActionKind::CreateTask => Action::CreateTask(TaskData {
            title: title()?,
            description,
            domain,
            project: fields.get_owned(&["project", "projecttitle"]),
            due_date: fields
                .get(&["duedate", "deadline", "date"])
                .and_then(parse_date),
            priority: fields
                .get(&["priority"])
                .and_then(|raw| Priority::from_str(raw.trim()).ok())
                .unwrap_or_default(),
            completed: false,
        }),
        ActionKind::CreateTimeBlock => {
            let start = fields
                .get(&["starttime", "start", "startdate"])
                .and_then(parse_local_datetime);
            let end = fields
                .get(&["endtime", "end", "enddate"])
                .and_then(parse_local_datetime);
            let (start, end) = resolve_time_block(start, end, now);
            Action::CreateTimeBlock(TimeBlockData {
                title: title()?,
                description,
                domain,
                start,
                end,
            })
        }
        ActionKind::CreateTodo => Action::CreateTodo(TodoData {
            title: title()?,
            tab: todo_tab(&fields),
            due_date: fields.get(&["duedate", "date"]).and_then(parse_date),
            completed: false,
        }),
        ActionKind::CreateTodoGroup => Action::CreateTodoGroup(TodoGroupData {
            title: title()?,
            tab: todo_tab(&fields),
            items: split_children(fields.get(&["items", "todos", "tasks"])),
        }),
        ActionKind::UpdateLifeDirection => {
            let text = fields
                .get_owned(&["direction", "text", "lifedirection"])
                .unwrap_or_else(|| block.body.trim().to_string());
            if text.is_empty() {
                return Err(malformed(block.kind, "empty body"));
            }
            Action::UpdateLifeDirection(LifeDirectionData { text })
        }
    };

    Ok(action)
}

fn todo_tab(fields: &Fields) -> String {
    fields
        .get(&["tab", "list"])
        .map(|raw| raw.trim().to_lowercase())
        .filter(|tab| !tab.is_empty())
        .unwrap_or_else(|| DEFAULT_TODO_TAB.to_string())
}

fn malformed(kind: ActionKind, reason: &str) -> DirectiveError {
    DirectiveError::Malformed {
        tag: kind.to_string(),
        reason: reason.to_string(),
    }
}
