//! Append-only audit trail of a bulk user operation.

use serde::Serialize;

/// Severity of a single log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Info,
    Error,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Info => "info",
            EntryKind::Error => "error",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionLogEntry {
    pub kind: EntryKind,
    pub text: String,
}

/// Outcome for one target of a bulk operation.
#[derive(Debug, Clone, Serialize)]
pub struct ActionLogEntity {
    name: String,
    entries: Vec<ActionLogEntry>,
}

impl ActionLogEntity {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[ActionLogEntry] {
        &self.entries
    }

    /// True iff at least one error line was appended.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.kind == EntryKind::Error)
    }

    pub fn log(&mut self, text: impl Into<String>) {
        self.entries.push(ActionLogEntry {
            kind: EntryKind::Info,
            text: text.into(),
        });
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.entries.push(ActionLogEntry {
            kind: EntryKind::Error,
            text: text.into(),
        });
    }
}

/// Audit log of one bulk action, rendered back to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct ActionLog {
    title: String,
    entities: Vec<ActionLogEntity>,
    /// Page the operator came from, for the "back" link.
    pub ref_url: Option<String>,
}

impl ActionLog {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entities: Vec::new(),
            ref_url: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn entities(&self) -> &[ActionLogEntity] {
        &self.entities
    }

    /// Append a new entity and return it for logging.
    pub fn add(&mut self, name: impl Into<String>) -> &mut ActionLogEntity {
        self.entities.push(ActionLogEntity::new(name.into()));
        let last = self.entities.len() - 1;
        &mut self.entities[last]
    }

    pub fn has_errors(&self) -> bool {
        self.entities.iter().any(ActionLogEntity::has_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_without_errors() {
        let mut log = ActionLog::new("Blocking users");
        let entity = log.add("user ada (id 3)");
        entity.log("account state was previously \"active\"");
        entity.log("gitlab account is now blocked");
        assert!(!entity.has_errors());
        assert!(!log.has_errors());
        assert_eq!(log.entities()[0].entries().len(), 2);
    }

    #[test]
    fn test_error_marks_entity() {
        let mut log = ActionLog::new("Blocking users");
        log.add("user ada (id 3)").log("fine");
        log.add("user id 4").error("getting user from gitlab: 404 Not found");
        assert!(!log.entities()[0].has_errors());
        assert!(log.entities()[1].has_errors());
        assert!(log.has_errors());
    }

    #[test]
    fn test_entries_keep_insertion_order() {
        let mut log = ActionLog::new("t");
        let entity = log.add("e");
        entity.log("one");
        entity.error("two");
        entity.log("three");
        let texts: Vec<&str> = entity.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(entity.entries()[1].kind, EntryKind::Error);
        assert!(entity.has_errors());
    }

    #[test]
    fn test_entry_kind_serialization() {
        let json = serde_json::to_string(&EntryKind::Error).unwrap();
        assert_eq!(json, r#""error""#);
        assert_eq!(EntryKind::Info.to_string(), "info");
    }
}
