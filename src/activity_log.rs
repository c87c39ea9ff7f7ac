use std::fmt;

use serde::Serialize;

use crate::diff::DiffEvent;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_label: Option<String>,
    pub description: String,
}

impl fmt::Display for ActivityLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.duration_label {
            Some(label) => write!(f, "[{label}] {}", self.description),
            None => write!(f, "{}", self.description),
        }
    }
}

/// Append-only record of what happened to the active slot during one episode.
#[derive(Debug, Clone, Default)]
pub struct ActivityLog {
    lines: Vec<ActivityLine>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, duration_label: Option<&str>, description: impl Into<String>) {
        self.lines.push(ActivityLine {
            duration_label: duration_label.map(str::to_string),
            description: description.into(),
        });
    }

    /// Appends one line per rendered description of `event` and returns how many were added.
    pub fn record_event(&mut self, event: &DiffEvent, duration_label: Option<&str>) -> usize {
        let descriptions = describe_event(event);
        let appended = descriptions.len();
        for description in descriptions {
            self.push(duration_label, description);
        }
        appended
    }

    pub fn reset(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[ActivityLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        let mut rendered = String::new();
        for line in &self.lines {
            rendered.push_str(&line.to_string());
            rendered.push('\n');
        }
        rendered
    }
}

pub fn describe_event(event: &DiffEvent) -> Vec<String> {
    match event {
        DiffEvent::SlotAdded { index, .. } => vec![format!("Slot {} added", index + 1)],
        DiffEvent::SlotRemoved { index } => vec![format!("Slot {} deleted", index + 1)],
        DiffEvent::FieldChanged { key, new_value } => vec![format!("{key}: {new_value}")],
        DiffEvent::SetItemsChanged {
            key,
            added,
            removed,
        } => added
            .iter()
            .map(|item| format!("{key}: +{item}"))
            .chain(removed.iter().map(|item| format!("{key}: -{item}")))
            .collect(),
        DiffEvent::RecordsChanged {
            key,
            added,
            removed,
        } => added
            .iter()
            .map(|record| format!("{key}: +{record}"))
            .chain(removed.iter().map(|record| format!("{key}: -{record}")))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::{describe_event, ActivityLog};
    use crate::diff::DiffEvent;
    use crate::save_file::{Record, Scalar};

    #[test]
    fn scalar_change_appends_single_line() {
        let mut log = ActivityLog::new();
        let appended = log.record_event(
            &DiffEvent::FieldChanged {
                key: "name".to_string(),
                new_value: "Hero".to_string(),
            },
            None,
        );

        assert_eq!(appended, 1);
        assert_eq!(log.lines()[0].to_string(), "name: Hero");
    }

    #[test]
    fn set_delta_appends_one_line_per_item() {
        let mut log = ActivityLog::new();
        log.record_event(
            &DiffEvent::SetItemsChanged {
                key: "triggersSet".to_string(),
                added: vec!["c".to_string(), "d".to_string()],
                removed: vec!["a".to_string()],
            },
            Some("0:01:02.500"),
        );

        assert_eq!(
            log.render(),
            "[0:01:02.500] triggersSet: +c\n[0:01:02.500] triggersSet: +d\n[0:01:02.500] triggersSet: -a\n"
        );
    }

    #[test]
    fn record_delta_uses_structural_rendering() {
        let lines = describe_event(&DiffEvent::RecordsChanged {
            key: "savedCharges".to_string(),
            added: vec![Record::new().with("id", Scalar::text("lever_1"))],
            removed: Vec::new(),
        });

        assert_eq!(lines, vec!["savedCharges: +{id: lever_1}".to_string()]);
    }

    #[test]
    fn reset_clears_all_lines() {
        let mut log = ActivityLog::new();
        log.push(None, "New Game started at 2024-03-02 18:22:33");
        assert_eq!(log.len(), 1);

        log.reset();
        assert!(log.is_empty());
        assert_eq!(log.render(), "");
    }
}
