use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde_yaml::{Mapping, Value};

use super::{
    read_save_file, FieldValue, ItemSet, Record, SaveFile, SaveSlot, Scalar, SnapshotError,
    DATE_MODIFIED_FIELD, SAVE_SLOTS_KEY,
};
use crate::persistence::write_text_atomically;
use crate::watcher::EditSignal;

const TRIGGERS_FIELD: &str = "triggersSet";
const SCROLLS_PICKED_UP_FIELD: &str = "scrollsPickedUp";
const MAP_SHAPES_FIELD: &str = "mapShapesUnlocked";
const SCROLL_COUNT: i64 = 81;

/// Equipment and boss flags paired with the map pin trigger the game sets for them.
const PIN_TRIGGERS: [(&str, &str); 13] = [
    ("waterblinkUnlocked", "pinCollected_WaterBlinkPickup"),
    ("powerSlideUnlocked", "pinCollected_SlidePickup"),
    ("mjolnirUnlocked", "pinCollected_MjolnirPickup"),
    ("blinkWireAxeUnlocked", "pinCollected_BlinkAxe"),
    ("doubleJumpUnlocked", "pinCollected_DoubleJump"),
    ("redCloakUnlocked", "pinCollected_RedCloak"),
    ("omniBlinkUnlocked", "pinCollected_OmniBlink"),
    ("secretsMapUnlocked", "pinCollected_MapSecretsPickup"),
    ("hulderBossfightBeaten", "pinCollected_HuldrFight"),
    ("mooseBossFightBeaten", "pinCollected_MooseFight"),
    ("fafnirBossFightBeaten", "pinCollected_FafnirFight"),
    ("halvtannBossFightBeaten", "pinCollected_HalvtannFight"),
    ("galvanBossFightBeaten", "pinCollected_GalvanFight"),
];

/// Rewrites the watched save file on behalf of the user.
///
/// Every write raises the watcher's edit signal first so the resulting change is
/// adopted as a new baseline instead of being reported as gameplay.
pub struct SaveEditor {
    save_path: PathBuf,
    edit_signal: EditSignal,
}

impl SaveEditor {
    pub fn new(save_path: impl Into<PathBuf>, edit_signal: EditSignal) -> Self {
        Self {
            save_path: save_path.into(),
            edit_signal,
        }
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }

    pub fn load(&self) -> Result<SaveFile, SnapshotError> {
        read_save_file(&self.save_path)
    }

    pub fn write(&self, save_file: &mut SaveFile) -> Result<(), String> {
        for slot in save_file.slots_mut() {
            reconcile_pin_triggers(slot);
        }

        let rendered = render_save_file(save_file)?;

        self.edit_signal.begin_edit();
        if let Err(error) = write_text_atomically(&self.save_path, &rendered) {
            self.edit_signal.cancel_edit();
            return Err(error);
        }

        tracing::info!(
            save_path = %self.save_path.display(),
            slot_count = save_file.len(),
            "Wrote edited save file"
        );
        Ok(())
    }
}

/// Brings derived fields back in line with the flags they mirror: pin triggers follow
/// the equipment/boss flags, and map shapes follow the collected scrolls.
pub fn reconcile_pin_triggers(slot: &mut SaveSlot) {
    ensure_set_field(slot, TRIGGERS_FIELD);
    for (flag_key, trigger) in PIN_TRIGGERS {
        let Some(flag) = slot.flag(flag_key) else {
            continue;
        };

        if let Some(triggers) = slot.set_mut(TRIGGERS_FIELD) {
            if flag {
                triggers.insert(Scalar::text(trigger));
            } else {
                triggers.remove(trigger);
            }
        }
    }

    let picked_up: BTreeSet<String> = slot
        .set(SCROLLS_PICKED_UP_FIELD)
        .map(ItemSet::membership)
        .unwrap_or_default();

    ensure_set_field(slot, MAP_SHAPES_FIELD);
    let Some(map_shapes) = slot.set_mut(MAP_SHAPES_FIELD) else {
        return;
    };

    for scroll in 1..=SCROLL_COUNT {
        let scroll_key = scroll.to_string();
        let collected = picked_up.contains(&scroll_key);
        let mapped = map_shapes.contains(&scroll_key);

        if collected && !mapped {
            map_shapes.insert(Scalar::Integer(scroll));
        } else if !collected && mapped {
            map_shapes.remove(&scroll_key);
        }
    }
}

fn ensure_set_field(slot: &mut SaveSlot, key: &str) {
    if slot.set(key).is_none() {
        slot.insert(key, FieldValue::Set(ItemSet::default()));
    }
}

pub fn render_save_file(save_file: &SaveFile) -> Result<String, String> {
    let slots = save_file.slots().iter().map(slot_to_value).collect();

    let mut root = Mapping::new();
    root.insert(
        Value::String(SAVE_SLOTS_KEY.to_string()),
        Value::Sequence(slots),
    );

    let rendered = serde_yaml::to_string(&Value::Mapping(root))
        .map_err(|error| format!("Failed to serialize save file: {error}"))?;

    Ok(unquote_date_modified(&rendered))
}

fn slot_to_value(slot: &SaveSlot) -> Value {
    let mut mapping = Mapping::new();
    for (key, field_value) in slot.fields() {
        let value = match field_value {
            FieldValue::Scalar(scalar) => scalar_to_value(scalar),
            FieldValue::Set(items) => {
                Value::Sequence(items.items().iter().map(scalar_to_value).collect())
            }
            FieldValue::Records(records) => {
                Value::Sequence(records.iter().map(record_to_value).collect())
            }
        };
        mapping.insert(Value::String(key.to_string()), value);
    }
    Value::Mapping(mapping)
}

fn record_to_value(record: &Record) -> Value {
    let mut mapping = Mapping::new();
    for (key, value) in record.entries() {
        mapping.insert(Value::String(key.clone()), scalar_to_value(value));
    }
    Value::Mapping(mapping)
}

fn scalar_to_value(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Null => Value::Null,
        Scalar::Bool(flag) => Value::Bool(*flag),
        Scalar::Integer(integer) => Value::Number((*integer).into()),
        Scalar::Float(float) => Value::Number((*float).into()),
        Scalar::Text(text) => Value::String(text.clone()),
        Scalar::Timestamp(timestamp) => Value::String(format_game_timestamp(timestamp)),
        Scalar::List(items) => Value::Sequence(items.iter().map(scalar_to_value).collect()),
        Scalar::Record(record) => record_to_value(record),
    }
}

/// The game writes seven fractional digits and rejects slots with fewer.
fn format_game_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
    format!(
        "{}.{:07}{}",
        timestamp.format("%Y-%m-%dT%H:%M:%S"),
        timestamp.timestamp_subsec_nanos() / 100,
        timestamp.format("%:z")
    )
}

/// The game also expects `dateModified` unquoted.
fn unquote_date_modified(rendered: &str) -> String {
    let prefix = format!("{DATE_MODIFIED_FIELD}: ");
    let mut output = String::with_capacity(rendered.len());

    for line in rendered.lines() {
        match line.find(&prefix) {
            Some(position) => {
                let (head, value) = line.split_at(position + prefix.len());
                let unquoted = ['\'', '"']
                    .into_iter()
                    .find_map(|quote| {
                        value
                            .strip_prefix(quote)
                            .and_then(|inner| inner.strip_suffix(quote))
                    })
                    .unwrap_or(value);
                output.push_str(head);
                output.push_str(unquoted);
            }
            None => output.push_str(line),
        }
        output.push('\n');
    }

    output
}
