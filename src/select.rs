//! Labelling for channel listing.
//!
//! A dialog entity carries different naming attributes depending on its
//! kind, and the precedence is explicit rather than duck-typed: a broadcast
//! title wins over a public handle, which wins over a personal first name.

use crate::feed::DialogEntity;

/// The naming attribute a dialog label was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityName {
    /// Channels and groups carry a title.
    Named(String),
    /// Public entities without a title still have a handle.
    Handled(String),
    /// Personal chats only have the peer's first name.
    Personal(String),
    /// Nothing usable; only the numeric ID identifies the entity.
    Anonymous,
}

impl EntityName {
    pub fn of(entity: &DialogEntity) -> Self {
        if let Some(title) = non_empty(&entity.title) {
            return EntityName::Named(title);
        }
        if let Some(username) = non_empty(&entity.username) {
            return EntityName::Handled(username);
        }
        if let Some(first_name) = non_empty(&entity.first_name) {
            return EntityName::Personal(first_name);
        }
        EntityName::Anonymous
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// The `"{name} ({id})"` line printed by `--list-channels`.
pub fn display_line(entity: &DialogEntity) -> String {
    match EntityName::of(entity) {
        EntityName::Named(name) | EntityName::Handled(name) | EntityName::Personal(name) => {
            format!("{} ({})", name, entity.id)
        }
        EntityName::Anonymous => format!("({})", entity.id),
    }
}
