use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diff::DiffEvent;

const DEFAULT_ROUTE: [&str; 7] = [
    "blinkUnlocked",
    "cloakUnlocked",
    "hulderBossfightBeaten",
    "mooseBossFightBeaten",
    "fafnirBossFightBeaten",
    "axeUnlocked",
    "galvanBossFightBeaten",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitTarget {
    pub event: String,
    pub value: String,
}

impl SplitTarget {
    pub fn new(event: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            value: value.into(),
        }
    }

    /// Scalar changes match on their new value; set changes match when the target
    /// value is among the added items. Removals and record changes never match.
    pub fn matches(&self, event: &DiffEvent) -> bool {
        match event {
            DiffEvent::FieldChanged { key, new_value } => {
                key.eq_ignore_ascii_case(&self.event) && new_value.eq_ignore_ascii_case(&self.value)
            }
            DiffEvent::SetItemsChanged { key, added, .. } => {
                key.eq_ignore_ascii_case(&self.event)
                    && added.iter().any(|item| item.eq_ignore_ascii_case(&self.value))
            }
            DiffEvent::SlotAdded { .. }
            | DiffEvent::SlotRemoved { .. }
            | DiffEvent::RecordsChanged { .. } => false,
        }
    }
}

impl fmt::Display for SplitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.event, self.value)
    }
}

pub fn default_split_route() -> Vec<SplitTarget> {
    DEFAULT_ROUTE
        .iter()
        .map(|event| SplitTarget::new(*event, "true"))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TrackerStatus {
    Inactive,
    Active { position: usize },
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerState {
    pub position: Option<usize>,
    pub active: bool,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRow {
    pub number: usize,
    pub event: String,
    pub value: String,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl SplitRow {
    /// `index|event: value|duration`, the completed-run export row.
    pub fn export_line(&self) -> String {
        format!(
            "{}|{}: {}|{}",
            self.number,
            self.event,
            self.value,
            self.duration.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAdvance {
    pub number: usize,
    pub target: SplitTarget,
    pub duration_label: Option<String>,
    pub run_completed: bool,
}

/// Ordered milestone tracker driven by classified slot events.
///
/// The cursor only moves forward. Any change to the target list restarts it.
#[derive(Debug, Clone)]
pub struct SplitsTracker {
    targets: Vec<SplitTarget>,
    durations: Vec<Option<String>>,
    status: TrackerStatus,
}

impl SplitsTracker {
    pub fn new(targets: Vec<SplitTarget>) -> Self {
        let mut tracker = Self {
            targets,
            durations: Vec::new(),
            status: TrackerStatus::Inactive,
        };
        tracker.reset();
        tracker
    }

    pub fn replace_targets(&mut self, targets: Vec<SplitTarget>) {
        self.targets = targets;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.durations = vec![None; self.targets.len()];
        self.status = if self.targets.is_empty() {
            TrackerStatus::Inactive
        } else {
            TrackerStatus::Active { position: 0 }
        };
    }

    pub fn targets(&self) -> &[SplitTarget] {
        &self.targets
    }

    pub fn status(&self) -> TrackerStatus {
        self.status
    }

    pub fn state(&self) -> TrackerState {
        match self.status {
            TrackerStatus::Inactive => TrackerState {
                position: None,
                active: false,
                completed: false,
            },
            TrackerStatus::Active { position } => TrackerState {
                position: Some(position),
                active: true,
                completed: false,
            },
            TrackerStatus::Completed => TrackerState {
                position: None,
                active: false,
                completed: true,
            },
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TrackerStatus::Completed
    }

    pub fn next_split(&self) -> Option<&SplitTarget> {
        match self.status {
            TrackerStatus::Active { position } => self.targets.get(position),
            TrackerStatus::Inactive | TrackerStatus::Completed => None,
        }
    }

    /// Feeds one event to the tracker; returns the completed split when it advanced.
    pub fn consume(&mut self, event: &DiffEvent, duration_label: Option<&str>) -> Option<SplitAdvance> {
        let TrackerStatus::Active { position } = self.status else {
            return None;
        };

        let target = self.targets.get(position)?;
        if !target.matches(event) {
            return None;
        }

        let target = target.clone();
        if let Some(duration) = self.durations.get_mut(position) {
            *duration = duration_label.map(str::to_string);
        }

        let next_position = position + 1;
        let run_completed = next_position >= self.targets.len();
        self.status = if run_completed {
            TrackerStatus::Completed
        } else {
            TrackerStatus::Active {
                position: next_position,
            }
        };

        Some(SplitAdvance {
            number: next_position,
            target,
            duration_label: duration_label.map(str::to_string),
            run_completed,
        })
    }

    pub fn rows(&self) -> Vec<SplitRow> {
        let completed_count = match self.status {
            TrackerStatus::Inactive => 0,
            TrackerStatus::Active { position } => position,
            TrackerStatus::Completed => self.targets.len(),
        };

        self.targets
            .iter()
            .enumerate()
            .map(|(index, target)| SplitRow {
                number: index + 1,
                event: target.event.clone(),
                value: target.value.clone(),
                completed: index < completed_count,
                duration: self.durations.get(index).cloned().flatten(),
            })
            .collect()
    }
}
