use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Canonical life areas every goal, project, task and time block is filed
/// under.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, Serialize,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum LifeDomain {
    Health,
    Work,
    Finance,
    Relationships,
    Learning,
    Personal,
    Spirituality,
    Home,
    #[default]
    General,
}

/// Free-text names the assistant tends to use, mapped to canonical domains.
static DOMAIN_ALIASES: &[(&str, LifeDomain)] = &[
    ("health", LifeDomain::Health),
    ("fitness", LifeDomain::Health),
    ("wellness", LifeDomain::Health),
    ("exercise", LifeDomain::Health),
    ("nutrition", LifeDomain::Health),
    ("sleep", LifeDomain::Health),
    ("mental health", LifeDomain::Health),
    ("work", LifeDomain::Work),
    ("career", LifeDomain::Work),
    ("business", LifeDomain::Work),
    ("job", LifeDomain::Work),
    ("professional", LifeDomain::Work),
    ("productivity", LifeDomain::Work),
    ("finance", LifeDomain::Finance),
    ("finances", LifeDomain::Finance),
    ("financial", LifeDomain::Finance),
    ("money", LifeDomain::Finance),
    ("budget", LifeDomain::Finance),
    ("investing", LifeDomain::Finance),
    ("relationships", LifeDomain::Relationships),
    ("relationship", LifeDomain::Relationships),
    ("family", LifeDomain::Relationships),
    ("friends", LifeDomain::Relationships),
    ("social", LifeDomain::Relationships),
    ("love", LifeDomain::Relationships),
    ("dating", LifeDomain::Relationships),
    ("learning", LifeDomain::Learning),
    ("education", LifeDomain::Learning),
    ("study", LifeDomain::Learning),
    ("skills", LifeDomain::Learning),
    ("reading", LifeDomain::Learning),
    ("growth", LifeDomain::Personal),
    ("personal", LifeDomain::Personal),
    ("personal growth", LifeDomain::Personal),
    ("hobbies", LifeDomain::Personal),
    ("hobby", LifeDomain::Personal),
    ("creativity", LifeDomain::Personal),
    ("fun", LifeDomain::Personal),
    ("recreation", LifeDomain::Personal),
    ("travel", LifeDomain::Personal),
    ("spirituality", LifeDomain::Spirituality),
    ("spiritual", LifeDomain::Spirituality),
    ("faith", LifeDomain::Spirituality),
    ("mindfulness", LifeDomain::Spirituality),
    ("meditation", LifeDomain::Spirituality),
    ("home", LifeDomain::Home),
    ("household", LifeDomain::Home),
    ("chores", LifeDomain::Home),
    ("general", LifeDomain::General),
    ("other", LifeDomain::General),
];

/// Map a free-text domain to its canonical value, `General` when unknown.
///
/// Exact alias matches win; otherwise the first alias appearing as a whole
/// word inside the input is used ("Health & Fitness" → `Health`).
pub fn normalize_domain(raw: &str) -> LifeDomain {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() {
        return LifeDomain::General;
    }

    if let Some((_, domain)) = DOMAIN_ALIASES.iter().find(|(alias, _)| *alias == needle) {
        return *domain;
    }

    let words: Vec<&str> = needle
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    DOMAIN_ALIASES
        .iter()
        .find(|(alias, _)| !alias.contains(' ') && words.contains(alias))
        .map_or(LifeDomain::General, |(_, domain)| *domain)
}
