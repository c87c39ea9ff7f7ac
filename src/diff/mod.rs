mod classify;

use chrono::{DateTime, FixedOffset};

use crate::save_file::SaveFile;

pub use classify::{classify_slot_update, format_duration_label, DiffEvent, ElapsedTimes};

/// The single slot-level change detected between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotTransition {
    Added {
        index: usize,
        start_time: Option<DateTime<FixedOffset>>,
    },
    Removed {
        index: usize,
    },
    Updated {
        index: usize,
    },
}

impl SlotTransition {
    pub fn index(&self) -> usize {
        match self {
            SlotTransition::Added { index, .. }
            | SlotTransition::Removed { index }
            | SlotTransition::Updated { index } => *index,
        }
    }
}

/// Locates the slot that changed between `previous` and `current`.
///
/// At most one slot is expected to change per observation. When several differ,
/// the first point of divergence wins and the rest go unreported.
pub fn locate_slot_transition(previous: &SaveFile, current: &SaveFile) -> Option<SlotTransition> {
    let previous_slots = previous.slots();
    let current_slots = current.slots();

    if current_slots.len() > previous_slots.len() {
        let index = current_slots.len() - 1;
        let start_time = current_slots
            .get(index)
            .and_then(|slot| slot.date_modified());
        return Some(SlotTransition::Added { index, start_time });
    }

    if current_slots.len() < previous_slots.len() {
        return previous_slots
            .iter()
            .enumerate()
            .find(|(index, previous_slot)| {
                current_slots
                    .get(*index)
                    .map(|current_slot| current_slot != *previous_slot)
                    .unwrap_or(true)
            })
            .map(|(index, _)| SlotTransition::Removed { index });
    }

    previous_slots
        .iter()
        .zip(current_slots)
        .position(|(previous_slot, current_slot)| previous_slot != current_slot)
        .map(|index| SlotTransition::Updated { index })
}

#[cfg(test)]
mod tests {
    use super::{locate_slot_transition, SlotTransition};
    use crate::save_file::{SaveFile, SaveSlot, Scalar};

    fn named_slot(name: &str) -> SaveSlot {
        SaveSlot::new()
            .with_scalar("name", Scalar::text(name))
            .with_scalar("blinkUnlocked", Scalar::Bool(false))
    }

    fn save_of(names: &[&str]) -> SaveFile {
        SaveFile::new(names.iter().map(|name| named_slot(name)).collect())
    }

    #[test]
    fn reports_added_slot_at_last_index() {
        let previous = save_of(&["A", "B"]);
        let mut current_slots = vec![named_slot("Changed"), named_slot("B")];
        current_slots.push(named_slot("C").with_scalar(
            "dateModified",
            Scalar::text("not a timestamp"),
        ));
        let current = SaveFile::new(current_slots);

        assert_eq!(
            locate_slot_transition(&previous, &current),
            Some(SlotTransition::Added {
                index: 2,
                start_time: None
            })
        );
    }

    #[test]
    fn reports_removed_slot_at_its_original_index() {
        let previous = save_of(&["A", "B", "C"]);

        assert_eq!(
            locate_slot_transition(&previous, &save_of(&["A", "C"])),
            Some(SlotTransition::Removed { index: 1 })
        );
        assert_eq!(
            locate_slot_transition(&previous, &save_of(&["A", "B"])),
            Some(SlotTransition::Removed { index: 2 })
        );
        assert_eq!(
            locate_slot_transition(&previous, &save_of(&["B", "C"])),
            Some(SlotTransition::Removed { index: 0 })
        );
    }

    #[test]
    fn multiple_deletions_report_first_divergence_only() {
        let previous = save_of(&["A", "B", "C", "D"]);

        assert_eq!(
            locate_slot_transition(&previous, &save_of(&["A", "D"])),
            Some(SlotTransition::Removed { index: 1 })
        );
    }

    #[test]
    fn reports_first_updated_slot_when_several_differ() {
        let previous = save_of(&["A", "B", "C"]);
        let current = save_of(&["A", "B2", "C2"]);

        assert_eq!(
            locate_slot_transition(&previous, &current),
            Some(SlotTransition::Updated { index: 1 })
        );
    }

    #[test]
    fn identical_saves_have_no_transition() {
        let previous = save_of(&["A", "B"]);
        assert_eq!(locate_slot_transition(&previous, &previous.clone()), None);
    }
}
