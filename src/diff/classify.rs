use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::save_file::{is_ignored_field, FieldValue, ItemSet, Record, SaveSlot};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum DiffEvent {
    SlotAdded {
        index: usize,
        #[serde(serialize_with = "serialize_optional_timestamp")]
        start_time: Option<DateTime<FixedOffset>>,
    },
    SlotRemoved {
        index: usize,
    },
    FieldChanged {
        key: String,
        new_value: String,
    },
    SetItemsChanged {
        key: String,
        added: Vec<String>,
        removed: Vec<String>,
    },
    RecordsChanged {
        key: String,
        added: Vec<Record>,
        removed: Vec<Record>,
    },
}

fn serialize_optional_timestamp<S>(
    value: &Option<DateTime<FixedOffset>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(timestamp) => serializer.serialize_str(&timestamp.to_rfc3339()),
        None => serializer.serialize_none(),
    }
}

/// Playtime figures derived once per slot update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElapsedTimes {
    pub in_game: Option<chrono::Duration>,
    pub real_time: Option<chrono::Duration>,
}

impl ElapsedTimes {
    pub fn measure(slot: &SaveSlot, episode_start: Option<DateTime<FixedOffset>>) -> Self {
        let real_time = episode_start
            .zip(slot.date_modified())
            .map(|(start, modified)| modified.signed_duration_since(start));

        Self {
            in_game: slot.time_spent(),
            real_time,
        }
    }

    /// Wall-clock time when an episode start is known, in-game time otherwise.
    pub fn preferred(&self) -> Option<chrono::Duration> {
        self.real_time.or(self.in_game)
    }

    pub fn preferred_label(&self) -> Option<String> {
        self.preferred().map(format_duration_label)
    }
}

pub fn format_duration_label(duration: chrono::Duration) -> String {
    let total_milliseconds = duration.num_milliseconds();
    let sign = if total_milliseconds < 0 { "-" } else { "" };
    let total_milliseconds = total_milliseconds.unsigned_abs();

    let hours = total_milliseconds / 3_600_000;
    let minutes = (total_milliseconds / 60_000) % 60;
    let seconds = (total_milliseconds / 1_000) % 60;
    let milliseconds = total_milliseconds % 1_000;

    format!("{sign}{hours}:{minutes:02}:{seconds:02}.{milliseconds:03}")
}

/// Field-by-field comparison of one slot across two snapshots.
///
/// Ignored bookkeeping fields never produce events. Events follow the current
/// slot's field order, followed by collections that vanished from it.
pub fn classify_slot_update(previous: &SaveSlot, current: &SaveSlot) -> Vec<DiffEvent> {
    let mut events = Vec::new();

    for (key, current_value) in current.fields() {
        if is_ignored_field(key) {
            continue;
        }

        let event = match current_value {
            FieldValue::Scalar(current_scalar) => {
                let changed = match previous.get(key) {
                    Some(FieldValue::Scalar(previous_scalar)) => previous_scalar != current_scalar,
                    _ => true,
                };
                changed.then(|| DiffEvent::FieldChanged {
                    key: key.to_string(),
                    new_value: current_scalar.to_string(),
                })
            }
            FieldValue::Set(current_items) => {
                set_delta(key, previous.set(key), Some(current_items))
            }
            FieldValue::Records(current_records) => records_delta(
                key,
                previous.records(key).unwrap_or_default(),
                current_records,
            ),
        };

        events.extend(event);
    }

    for (key, previous_value) in previous.fields() {
        if is_ignored_field(key) || current.get(key).is_some() {
            continue;
        }

        let event = match previous_value {
            FieldValue::Scalar(_) => None,
            FieldValue::Set(previous_items) => set_delta(key, Some(previous_items), None),
            FieldValue::Records(previous_records) => records_delta(key, previous_records, &[]),
        };

        events.extend(event);
    }

    events
}

fn set_delta(key: &str, previous: Option<&ItemSet>, current: Option<&ItemSet>) -> Option<DiffEvent> {
    let previous_membership = previous.map(ItemSet::membership).unwrap_or_default();
    let current_membership: BTreeSet<String> = current.map(ItemSet::membership).unwrap_or_default();

    let added: Vec<String> = current_membership
        .difference(&previous_membership)
        .cloned()
        .collect();
    let removed: Vec<String> = previous_membership
        .difference(&current_membership)
        .cloned()
        .collect();

    if added.is_empty() && removed.is_empty() {
        return None;
    }

    Some(DiffEvent::SetItemsChanged {
        key: key.to_string(),
        added,
        removed,
    })
}

fn records_delta(key: &str, previous: &[Record], current: &[Record]) -> Option<DiffEvent> {
    let added: Vec<Record> = current
        .iter()
        .filter(|record| !previous.contains(record))
        .cloned()
        .collect();
    let removed: Vec<Record> = previous
        .iter()
        .filter(|record| !current.contains(record))
        .cloned()
        .collect();

    if added.is_empty() && removed.is_empty() {
        return None;
    }

    Some(DiffEvent::RecordsChanged {
        key: key.to_string(),
        added,
        removed,
    })
}
