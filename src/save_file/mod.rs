mod editor;
mod loader;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::ser::{Serialize, SerializeMap, Serializer};

pub use editor::{reconcile_pin_triggers, render_save_file, SaveEditor};
pub use loader::{modified_time, parse_save_file, read_save_file, SnapshotError};

pub(crate) const SAVE_SLOTS_KEY: &str = "saveDataSlots";
pub(crate) const DATE_MODIFIED_FIELD: &str = "dateModified";
pub(crate) const TIME_SPENT_FIELD: &str = "timeSpent";
pub(crate) const NAME_FIELD: &str = "name";
pub(crate) const RESPAWN_SCENE_FIELD: &str = "respawnScene";
pub(crate) const RESPAWN_POINT_FIELD: &str = "respawnPoint";

const SET_FIELDS: [&str; 6] = [
    "triggersSet",
    "mapShapesUnlocked",
    "activitiesUnlocked",
    "scrollsPickedUp",
    "scrollsSeenInCollection",
    "savedResetInfos",
];
const RECORD_LIST_FIELDS: [&str; 1] = ["savedCharges"];
const IGNORED_FIELDS: [&str; 3] = [DATE_MODIFIED_FIELD, TIME_SPENT_FIELD, "respawnFacingRight"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    Set,
    RecordList,
}

pub fn field_kind(key: &str) -> FieldKind {
    if SET_FIELDS.contains(&key) {
        FieldKind::Set
    } else if RECORD_LIST_FIELDS.contains(&key) {
        FieldKind::RecordList
    } else {
        FieldKind::Scalar
    }
}

/// Bookkeeping fields that count toward slot equality but never produce an event.
pub fn is_ignored_field(key: &str) -> bool {
    IGNORED_FIELDS.contains(&key)
}

#[derive(Debug, Clone)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<FixedOffset>),
    List(Vec<Scalar>),
    Record(Record),
}

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(value) => Some(*value as f64),
            Scalar::Float(value) => Some(*value),
            _ => None,
        }
    }
}

/// Floats compare by bit pattern so a stored `.nan` still equals itself.
impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(left), Scalar::Bool(right)) => left == right,
            (Scalar::Integer(left), Scalar::Integer(right)) => left == right,
            (Scalar::Float(left), Scalar::Float(right)) => left.to_bits() == right.to_bits(),
            (Scalar::Text(left), Scalar::Text(right)) => left == right,
            (Scalar::Timestamp(left), Scalar::Timestamp(right)) => left == right,
            (Scalar::List(left), Scalar::List(right)) => left == right,
            (Scalar::Record(left), Scalar::Record(right)) => left == right,
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Integer(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Text(value) => write!(f, "{value}"),
            Scalar::Timestamp(value) => write!(f, "{}", value.to_rfc3339()),
            Scalar::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Scalar::Record(record) => write!(f, "{record}"),
        }
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(value) => serializer.serialize_bool(*value),
            Scalar::Integer(value) => serializer.serialize_i64(*value),
            Scalar::Float(value) => serializer.serialize_f64(*value),
            Scalar::Text(value) => serializer.serialize_str(value),
            Scalar::Timestamp(value) => serializer.serialize_str(&value.to_rfc3339()),
            Scalar::List(items) => serializer.collect_seq(items),
            Scalar::Record(record) => record.serialize(serializer),
        }
    }
}

/// A small key/value record, compared structurally regardless of key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: BTreeMap<String, Scalar>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Scalar) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Scalar) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Scalar)> {
        self.entries.iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (index, (key, value)) in self.entries.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        write!(f, "}}")
    }
}

/// Unordered collection of identifiers. Items keep their original scalar type so
/// the editor can write them back unchanged; membership uses the rendered text.
#[derive(Debug, Clone, Default)]
pub struct ItemSet {
    items: Vec<Scalar>,
}

impl ItemSet {
    pub fn new(items: Vec<Scalar>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Scalar] {
        &self.items
    }

    pub fn contains(&self, item: &str) -> bool {
        self.items.iter().any(|value| value.to_string() == item)
    }

    pub fn insert(&mut self, item: Scalar) {
        if !self.contains(&item.to_string()) {
            self.items.push(item);
        }
    }

    pub fn remove(&mut self, item: &str) {
        self.items.retain(|value| value.to_string() != item);
    }

    pub fn membership(&self) -> BTreeSet<String> {
        self.items.iter().map(ToString::to_string).collect()
    }
}

impl PartialEq for ItemSet {
    fn eq(&self, other: &Self) -> bool {
        self.membership() == other.membership()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Scalar(Scalar),
    Set(ItemSet),
    Records(Vec<Record>),
}

#[derive(Debug, Clone, Default)]
pub struct SaveSlot {
    fields: BTreeMap<String, FieldValue>,
    field_order: Vec<String>,
}

impl PartialEq for SaveSlot {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl SaveSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.insert(key, value);
        self
    }

    pub fn with_scalar(self, key: impl Into<String>, value: Scalar) -> Self {
        self.with_field(key, FieldValue::Scalar(value))
    }

    pub fn with_set(self, key: impl Into<String>, items: Vec<Scalar>) -> Self {
        self.with_field(key, FieldValue::Set(ItemSet::new(items)))
    }

    pub fn with_records(self, key: impl Into<String>, records: Vec<Record>) -> Self {
        self.with_field(key, FieldValue::Records(records))
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        if !self.fields.contains_key(&key) {
            self.field_order.push(key.clone());
        }
        self.fields.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn scalar(&self, key: &str) -> Option<&Scalar> {
        match self.fields.get(key) {
            Some(FieldValue::Scalar(value)) => Some(value),
            _ => None,
        }
    }

    pub fn set(&self, key: &str) -> Option<&ItemSet> {
        match self.fields.get(key) {
            Some(FieldValue::Set(items)) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn set_mut(&mut self, key: &str) -> Option<&mut ItemSet> {
        match self.fields.get_mut(key) {
            Some(FieldValue::Set(items)) => Some(items),
            _ => None,
        }
    }

    pub fn records(&self, key: &str) -> Option<&[Record]> {
        match self.fields.get(key) {
            Some(FieldValue::Records(records)) => Some(records),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.scalar(key).and_then(Scalar::as_bool)
    }

    /// Fields in document order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.field_order
            .iter()
            .filter_map(|key| self.fields.get(key).map(|value| (key.as_str(), value)))
    }

    pub fn name(&self) -> Option<String> {
        self.scalar(NAME_FIELD).map(ToString::to_string)
    }

    pub fn respawn_scene(&self) -> Option<String> {
        self.scalar(RESPAWN_SCENE_FIELD).map(ToString::to_string)
    }

    pub fn respawn_point(&self) -> Option<(f64, f64)> {
        let Some(Scalar::Record(point)) = self.scalar(RESPAWN_POINT_FIELD) else {
            return None;
        };

        let x = point.get("x").and_then(Scalar::as_f64)?;
        let y = point.get("y").and_then(Scalar::as_f64)?;
        Some((x, y))
    }

    pub fn date_modified(&self) -> Option<DateTime<FixedOffset>> {
        match self.scalar(DATE_MODIFIED_FIELD) {
            Some(Scalar::Timestamp(value)) => Some(*value),
            _ => None,
        }
    }

    /// In-game playtime, stored either as seconds or as an `HH:MM:SS.ff` string.
    pub fn time_spent(&self) -> Option<chrono::Duration> {
        match self.scalar(TIME_SPENT_FIELD)? {
            Scalar::Integer(seconds) => chrono::Duration::try_seconds(*seconds),
            Scalar::Float(seconds) => seconds_to_duration(*seconds),
            Scalar::Text(encoded) => parse_clock_duration(encoded),
            _ => None,
        }
    }
}

fn seconds_to_duration(seconds: f64) -> Option<chrono::Duration> {
    let milliseconds = (seconds * 1000.0).round();
    if !milliseconds.is_finite() || milliseconds.abs() >= i64::MAX as f64 {
        return None;
    }

    chrono::Duration::try_milliseconds(milliseconds as i64)
}

fn parse_clock_duration(encoded: &str) -> Option<chrono::Duration> {
    let mut parts = encoded.trim().rsplit(':');
    let seconds = parts.next()?.parse::<f64>().ok()?;
    let minutes = match parts.next() {
        Some(value) => value.parse::<i64>().ok()?,
        None => 0,
    };
    let hours = match parts.next() {
        Some(value) => value.parse::<i64>().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }

    seconds_to_duration(seconds)?
        .checked_add(&chrono::Duration::try_minutes(minutes)?)?
        .checked_add(&chrono::Duration::try_hours(hours)?)
}

/// An ordered list of save slots; index order is slot order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveFile {
    slots: Vec<SaveSlot>,
}

impl SaveFile {
    pub fn new(slots: Vec<SaveSlot>) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[SaveSlot] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [SaveSlot] {
        &mut self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&SaveSlot> {
        self.slots.get(index)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
