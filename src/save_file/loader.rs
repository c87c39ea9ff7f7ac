use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde_yaml::{Mapping, Value};

use super::{
    field_kind, FieldKind, FieldValue, ItemSet, Record, SaveFile, SaveSlot, Scalar,
    DATE_MODIFIED_FIELD, SAVE_SLOTS_KEY,
};

const FALLBACK_SLOTS_KEY: &str = "slots";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("save file not found at '{}'", .0.display())]
    Missing(PathBuf),
    #[error("failed to read save file '{}': {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("failed to parse save file: {0}")]
    Parse(String),
    #[error("save file has an unexpected shape: {0}")]
    Shape(String),
}

impl SnapshotError {
    pub fn is_missing(&self) -> bool {
        matches!(self, SnapshotError::Missing(_))
    }

    fn from_io(path: &Path, error: std::io::Error) -> Self {
        if error.kind() == ErrorKind::NotFound {
            return SnapshotError::Missing(path.to_path_buf());
        }

        SnapshotError::Io {
            path: path.to_path_buf(),
            message: error.to_string(),
        }
    }
}

pub fn modified_time(path: &Path) -> Result<SystemTime, SnapshotError> {
    std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .map_err(|error| SnapshotError::from_io(path, error))
}

pub fn read_save_file(path: &Path) -> Result<SaveFile, SnapshotError> {
    let raw_yaml =
        std::fs::read_to_string(path).map_err(|error| SnapshotError::from_io(path, error))?;
    parse_save_file(&raw_yaml)
}

pub fn parse_save_file(raw_yaml: &str) -> Result<SaveFile, SnapshotError> {
    let document = serde_yaml::from_str::<Value>(raw_yaml)
        .map_err(|error| SnapshotError::Parse(error.to_string()))?;

    let Value::Mapping(root) = document else {
        return Err(SnapshotError::Shape(
            "document root is not a mapping".to_string(),
        ));
    };

    let slots_value = root
        .get(SAVE_SLOTS_KEY)
        .or_else(|| root.get(FALLBACK_SLOTS_KEY))
        .ok_or_else(|| SnapshotError::Shape(format!("missing '{SAVE_SLOTS_KEY}' list")))?;

    let slot_values: &[Value] = match slots_value {
        Value::Sequence(values) => values.as_slice(),
        Value::Null => &[],
        _ => {
            return Err(SnapshotError::Shape(format!(
                "'{SAVE_SLOTS_KEY}' is not a list"
            )));
        }
    };

    let slots = slot_values
        .iter()
        .enumerate()
        .map(|(index, value)| parse_save_slot(index, value))
        .collect::<Result<Vec<SaveSlot>, SnapshotError>>()?;

    Ok(SaveFile::new(slots))
}

fn parse_save_slot(index: usize, value: &Value) -> Result<SaveSlot, SnapshotError> {
    let Value::Mapping(mapping) = untag(value) else {
        return Err(SnapshotError::Shape(format!(
            "save slot #{} is not a mapping",
            index + 1
        )));
    };

    let mut slot = SaveSlot::new();
    for (key_value, field_value) in mapping {
        let key = key_text(key_value);
        let parsed = match field_kind(&key) {
            FieldKind::Scalar => FieldValue::Scalar(parse_scalar(&key, field_value)),
            FieldKind::Set => FieldValue::Set(parse_item_set(index, &key, field_value)?),
            FieldKind::RecordList => {
                FieldValue::Records(parse_record_list(index, &key, field_value)?)
            }
        };
        slot.insert(key, parsed);
    }

    Ok(slot)
}

fn parse_item_set(index: usize, key: &str, value: &Value) -> Result<ItemSet, SnapshotError> {
    match untag(value) {
        Value::Null => Ok(ItemSet::default()),
        Value::Sequence(items) => Ok(ItemSet::new(
            items.iter().map(|item| parse_scalar(key, item)).collect(),
        )),
        _ => Err(SnapshotError::Shape(format!(
            "save slot #{} field '{key}' is not a list",
            index + 1
        ))),
    }
}

fn parse_record_list(
    index: usize,
    key: &str,
    value: &Value,
) -> Result<Vec<Record>, SnapshotError> {
    let items = match untag(value) {
        Value::Null => return Ok(Vec::new()),
        Value::Sequence(items) => items,
        _ => {
            return Err(SnapshotError::Shape(format!(
                "save slot #{} field '{key}' is not a list",
                index + 1
            )));
        }
    };

    items
        .iter()
        .map(|item| match untag(item) {
            Value::Mapping(mapping) => Ok(parse_record(mapping)),
            _ => Err(SnapshotError::Shape(format!(
                "save slot #{} field '{key}' holds a non-record entry",
                index + 1
            ))),
        })
        .collect()
}

fn parse_record(mapping: &Mapping) -> Record {
    let mut record = Record::new();
    for (key_value, value) in mapping {
        let key = key_text(key_value);
        let parsed = parse_scalar(&key, value);
        record.insert(key, parsed);
    }
    record
}

fn parse_scalar(key: &str, value: &Value) -> Scalar {
    match untag(value) {
        Value::Null => Scalar::Null,
        Value::Bool(flag) => Scalar::Bool(*flag),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Scalar::Integer(integer),
            None => number.as_f64().map(Scalar::Float).unwrap_or(Scalar::Null),
        },
        Value::String(text) => {
            if key == DATE_MODIFIED_FIELD {
                if let Some(timestamp) = parse_timestamp(text) {
                    return Scalar::Timestamp(timestamp);
                }
            }
            Scalar::Text(text.clone())
        }
        Value::Sequence(items) => {
            Scalar::List(items.iter().map(|item| parse_scalar(key, item)).collect())
        }
        Value::Mapping(mapping) => Scalar::Record(parse_record(mapping)),
        Value::Tagged(tagged) => parse_scalar(key, &tagged.value),
    }
}

fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn key_text(value: &Value) -> String {
    match untag(value) {
        Value::String(text) => text.clone(),
        other => parse_scalar("", other).to_string(),
    }
}

pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = text.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(timestamp);
    }

    if let Ok(timestamp) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f %:z") {
        return Some(timestamp);
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().fixed_offset())
}

#[cfg(test)]
mod tests {
    use super::{parse_save_file, read_save_file, SnapshotError};
    use crate::save_file::{FieldValue, Record, Scalar};
    use std::time::{SystemTime, UNIX_EPOCH};

    const SAMPLE_SAVE: &str = r#"
saveDataSlots:
- version: 1.6
  name: Slot
  dateModified: 2024-03-02T18:22:33.1234567-05:00
  timeSpent: 125.5
  respawnScene: Lumina Landed
  respawnFacingRight: true
  respawnPoint:
    x: -117.732597
    y: -173.997604
  blinkUnlocked: false
  triggersSet:
  - intro_done
  - pinCollected_Blink
  scrollsPickedUp:
  - 3
  - 12
  savedCharges:
  - id: lever_1
    charge: positive
  savedResetInfos: []
"#;

    #[test]
    fn parses_slots_with_typed_fields() {
        let save_file = parse_save_file(SAMPLE_SAVE).expect("Expected sample save to parse");
        assert_eq!(save_file.len(), 1);

        let slot = save_file.slot(0).expect("Expected first slot");
        assert_eq!(slot.name().as_deref(), Some("Slot"));
        assert_eq!(slot.flag("blinkUnlocked"), Some(false));
        assert_eq!(slot.respawn_point(), Some((-117.732597, -173.997604)));

        let triggers = slot.set("triggersSet").expect("Expected triggersSet set");
        assert!(triggers.contains("pinCollected_Blink"));

        let scrolls = slot.set("scrollsPickedUp").expect("Expected scrollsPickedUp set");
        assert_eq!(scrolls.items(), &[Scalar::Integer(3), Scalar::Integer(12)]);

        assert_eq!(
            slot.records("savedCharges"),
            Some(
                &[Record::new()
                    .with("id", Scalar::text("lever_1"))
                    .with("charge", Scalar::text("positive"))][..]
            )
        );
        assert!(matches!(
            slot.get("savedResetInfos"),
            Some(FieldValue::Set(items)) if items.items().is_empty()
        ));
    }

    #[test]
    fn parses_seven_digit_date_modified() {
        let save_file = parse_save_file(SAMPLE_SAVE).expect("Expected sample save to parse");
        let slot = save_file.slot(0).expect("Expected first slot");
        let date_modified = slot
            .date_modified()
            .expect("Expected dateModified to parse as a timestamp");

        assert_eq!(date_modified.timestamp_subsec_nanos(), 123_456_700);
        assert_eq!(date_modified.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn rejects_truncated_documents() {
        let error = parse_save_file("saveDataSlots:\n- name: [unterminated")
            .expect_err("Expected truncated yaml to fail");
        assert!(matches!(error, SnapshotError::Parse(_)));

        let error = parse_save_file("").expect_err("Expected empty document to fail");
        assert!(matches!(
            error,
            SnapshotError::Shape(_) | SnapshotError::Parse(_)
        ));
    }

    #[test]
    fn accepts_empty_slot_list() {
        let save_file =
            parse_save_file("saveDataSlots: []\n").expect("Expected empty slot list to parse");
        assert!(save_file.is_empty());
    }

    #[test]
    fn reports_missing_file() {
        let timestamp_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_nanos())
            .unwrap_or(0);
        let missing_path =
            std::env::temp_dir().join(format!("savewatch_missing_{timestamp_nanos}.yaml"));

        let error = read_save_file(&missing_path).expect_err("Expected missing file error");
        assert!(error.is_missing());
    }
}
