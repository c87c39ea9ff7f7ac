mod events;
mod handle;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, FixedOffset, Local};
use serde::Serialize;

use crate::activity_log::{ActivityLine, ActivityLog};
use crate::diff::{classify_slot_update, locate_slot_transition, DiffEvent, ElapsedTimes, SlotTransition};
use crate::persistence::{episode_log_path, write_activity_log, write_completed_run};
use crate::save_file::{modified_time, read_save_file, SaveFile, SaveSlot, SnapshotError};
use crate::settings::WatcherSettings;
use crate::splits::{SplitRow, SplitTarget, SplitsTracker, TrackerState};
use crate::timer_bridge::TimerBridge;

pub use handle::{spawn_watcher, WatcherHandle};

/// Single-shot "the next change is ours" flag shared with the save editor.
#[derive(Debug, Clone, Default)]
pub struct EditSignal {
    pending: Arc<AtomicBool>,
}

impl EditSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_edit(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    pub fn cancel_edit(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    fn take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum WatchState {
    Initialized,
    NoSaveFile,
    SaveFileLoaded,
    SlotAdded,
    SlotDeleted,
    SlotUpdated,
}

/// What a single tick of the watch loop did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Halted,
    NoSaveFile,
    Unchanged,
    LoadFailed { message: String },
    SelfEditAdopted,
    FileLoaded { slot_count: usize },
    SlotAdded { index: usize },
    SlotRemoved { index: usize },
    SlotUpdated { index: usize, events: Vec<DiffEvent> },
    ContentUnchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub name: Option<String>,
    pub respawn_scene: Option<String>,
    pub respawn_x: Option<f64>,
    pub respawn_y: Option<f64>,
}

impl SlotSummary {
    fn from_slot(slot: &SaveSlot) -> Self {
        let respawn_point = slot.respawn_point();
        Self {
            name: slot.name(),
            respawn_scene: slot.respawn_scene(),
            respawn_x: respawn_point.map(|(x, _)| x),
            respawn_y: respawn_point.map(|(_, y)| y),
        }
    }
}

/// Everything the presentation layer shows, captured after a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherSnapshot {
    pub state: WatchState,
    pub save_path: String,
    pub halted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_number: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_slot: Option<SlotSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_game_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub real_time: Option<String>,
    pub activity: Vec<ActivityLine>,
    pub recent_events: Vec<DiffEvent>,
    pub tracker: TrackerState,
    pub splits: Vec<SplitRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_split: Option<SplitTarget>,
}

/// Polls one save file, turning each observed change into slot transitions,
/// activity lines and split progress.
pub struct SaveWatcher {
    settings: WatcherSettings,
    bridge: Box<dyn TimerBridge>,
    edit_signal: EditSignal,
    halted: bool,
    previous_modified: Option<SystemTime>,
    baseline: Option<SaveFile>,
    state: WatchState,
    active_slot_index: Option<usize>,
    episode_start: Option<DateTime<FixedOffset>>,
    elapsed: ElapsedTimes,
    activity_log: ActivityLog,
    recent_events: Vec<DiffEvent>,
    tracker: SplitsTracker,
    episode_log_path: PathBuf,
}

impl SaveWatcher {
    pub fn new(settings: WatcherSettings, bridge: Box<dyn TimerBridge>) -> Self {
        let tracker = SplitsTracker::new(settings.splits.clone());
        let episode_log_path = episode_log_path(&settings.output_directory, Local::now());

        Self {
            settings,
            bridge,
            edit_signal: EditSignal::new(),
            halted: false,
            previous_modified: None,
            baseline: None,
            state: WatchState::Initialized,
            active_slot_index: None,
            episode_start: None,
            elapsed: ElapsedTimes::default(),
            activity_log: ActivityLog::new(),
            recent_events: Vec::new(),
            tracker,
            episode_log_path,
        }
    }

    pub fn edit_signal(&self) -> EditSignal {
        self.edit_signal.clone()
    }

    pub fn settings(&self) -> &WatcherSettings {
        &self.settings
    }

    pub fn save_path(&self) -> &Path {
        &self.settings.save_path
    }

    pub fn poll_interval(&self) -> Duration {
        self.settings.poll_interval()
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn baseline(&self) -> Option<&SaveFile> {
        self.baseline.as_ref()
    }

    pub fn activity_log(&self) -> &ActivityLog {
        &self.activity_log
    }

    pub fn tracker(&self) -> &SplitsTracker {
        &self.tracker
    }

    pub fn episode_log_path(&self) -> &Path {
        &self.episode_log_path
    }

    /// Installs a new split list. The tracker always restarts from the first split.
    pub fn replace_splits(&mut self, splits: Vec<SplitTarget>) {
        tracing::info!(split_count = splits.len(), "Split list replaced");
        self.settings.splits = splits.clone();
        self.tracker.replace_targets(splits);
        events::notify_timer_reset(self.bridge.as_mut());
    }

    /// Re-arms a watcher halted by a missing save file. The next load starts from scratch.
    pub fn retry(&mut self) {
        if !self.halted {
            return;
        }

        tracing::info!(save_path = %self.settings.save_path.display(), "Retrying save file watch");
        self.halted = false;
        self.previous_modified = None;
        self.baseline = None;
        self.state = WatchState::Initialized;
    }

    pub fn tick(&mut self) -> TickOutcome {
        if self.halted {
            return TickOutcome::Halted;
        }

        let save_path = self.settings.save_path.clone();
        let modified = match modified_time(&save_path) {
            Ok(modified) => modified,
            Err(error) => return self.handle_load_error(error),
        };

        self.observe_snapshot(modified, || read_save_file(&save_path))
    }

    /// Runs one tick against an already-stat'ed modification time. `load` is only
    /// called when the time differs from the last successfully parsed one.
    pub fn observe_snapshot<F>(&mut self, modified: SystemTime, load: F) -> TickOutcome
    where
        F: FnOnce() -> Result<SaveFile, SnapshotError>,
    {
        if self.halted {
            return TickOutcome::Halted;
        }

        if self.previous_modified == Some(modified) {
            return TickOutcome::Unchanged;
        }

        let current = match load() {
            Ok(save_file) => save_file,
            Err(error) => return self.handle_load_error(error),
        };
        self.previous_modified = Some(modified);

        if self.edit_signal.take() {
            self.adopt_self_edit(current);
            return TickOutcome::SelfEditAdopted;
        }

        let Some(previous) = self.baseline.take() else {
            let slot_count = current.len();
            tracing::info!(
                save_path = %self.settings.save_path.display(),
                slot_count,
                "Save file loaded"
            );
            self.state = WatchState::SaveFileLoaded;
            self.baseline = Some(current);
            return TickOutcome::FileLoaded { slot_count };
        };

        let outcome = match locate_slot_transition(&previous, &current) {
            Some(SlotTransition::Added { index, start_time }) => {
                self.handle_slot_added(index, start_time, &current);
                TickOutcome::SlotAdded { index }
            }
            Some(SlotTransition::Removed { index }) => {
                self.handle_slot_removed(index);
                TickOutcome::SlotRemoved { index }
            }
            Some(SlotTransition::Updated { index }) => {
                let events = self.handle_slot_updated(index, &previous, &current);
                TickOutcome::SlotUpdated { index, events }
            }
            None => TickOutcome::ContentUnchanged,
        };

        self.baseline = Some(current);
        outcome
    }

    pub fn snapshot(&self) -> WatcherSnapshot {
        // A deleted slot's index now points at whichever slot shifted into it.
        let active_slot = self
            .active_slot_index
            .filter(|_| self.state != WatchState::SlotDeleted)
            .and_then(|index| self.baseline.as_ref()?.slot(index))
            .map(SlotSummary::from_slot);

        WatcherSnapshot {
            state: self.state,
            save_path: self.settings.save_path.to_string_lossy().to_string(),
            halted: self.halted,
            slot_number: self.active_slot_index.map(|index| index + 1),
            active_slot,
            in_game_time: self.elapsed.in_game.map(crate::diff::format_duration_label),
            real_time: self.elapsed.real_time.map(crate::diff::format_duration_label),
            activity: self.activity_log.lines().to_vec(),
            recent_events: self.recent_events.clone(),
            tracker: self.tracker.state(),
            splits: self.tracker.rows(),
            next_split: self.tracker.next_split().cloned(),
        }
    }

    fn handle_load_error(&mut self, error: SnapshotError) -> TickOutcome {
        if error.is_missing() {
            tracing::warn!(
                save_path = %self.settings.save_path.display(),
                "Save file not found, watching paused until retry"
            );
            self.halted = true;
            self.state = WatchState::NoSaveFile;
            return TickOutcome::NoSaveFile;
        }

        tracing::warn!(
            save_path = %self.settings.save_path.display(),
            snapshot_error = %error,
            "Failed to load save file, retrying next tick"
        );
        TickOutcome::LoadFailed {
            message: error.to_string(),
        }
    }

    fn adopt_self_edit(&mut self, current: SaveFile) {
        tracing::info!(
            save_path = %self.settings.save_path.display(),
            "Adopted edited save file as new baseline"
        );
        if self.baseline.is_none() {
            self.state = WatchState::SaveFileLoaded;
        }
        self.baseline = Some(current);
        self.activity_log.reset();
        self.recent_events.clear();
        self.tracker.reset();
        events::notify_timer_reset(self.bridge.as_mut());
    }

    fn begin_episode(&mut self) {
        self.activity_log.reset();
        self.recent_events.clear();
        self.episode_log_path = episode_log_path(&self.settings.output_directory, Local::now());
    }

    fn handle_slot_added(
        &mut self,
        index: usize,
        start_time: Option<DateTime<FixedOffset>>,
        current: &SaveFile,
    ) {
        tracing::info!(slot_number = index + 1, "Save slot added");
        self.begin_episode();
        self.state = WatchState::SlotAdded;
        self.active_slot_index = Some(index);
        self.episode_start = start_time;
        self.elapsed = current
            .slot(index)
            .map(|slot| ElapsedTimes::measure(slot, start_time))
            .unwrap_or_default();

        let started_at = match start_time {
            Some(start_time) => start_time.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            None => Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        };
        self.activity_log
            .push(None, format!("New Game started at {started_at}"));
        self.recent_events.push(DiffEvent::SlotAdded { index, start_time });

        events::notify_timer_start(self.bridge.as_mut());
    }

    fn handle_slot_removed(&mut self, index: usize) {
        tracing::info!(slot_number = index + 1, "Save slot deleted");
        self.begin_episode();
        self.state = WatchState::SlotDeleted;
        self.active_slot_index = Some(index);
        self.recent_events.push(DiffEvent::SlotRemoved { index });
    }

    fn handle_slot_updated(
        &mut self,
        index: usize,
        previous: &SaveFile,
        current: &SaveFile,
    ) -> Vec<DiffEvent> {
        self.state = WatchState::SlotUpdated;
        self.active_slot_index = Some(index);

        let (Some(previous_slot), Some(current_slot)) = (previous.slot(index), current.slot(index))
        else {
            return Vec::new();
        };

        self.elapsed = ElapsedTimes::measure(current_slot, self.episode_start);
        let duration_label = self.elapsed.preferred_label();
        let label = duration_label.as_deref();

        let diff_events = classify_slot_update(previous_slot, current_slot);
        tracing::debug!(
            slot_number = index + 1,
            event_count = diff_events.len(),
            "Save slot updated"
        );

        for event in &diff_events {
            self.activity_log.record_event(event, label);
        }
        for event in &diff_events {
            self.advance_tracker(event, label);
        }
        self.recent_events = diff_events.clone();

        if self.settings.save_activity_log {
            events::report_persistence_result(
                "activity log",
                write_activity_log(&self.episode_log_path, &self.activity_log),
            );
        }

        diff_events
    }

    fn advance_tracker(&mut self, event: &DiffEvent, label: Option<&str>) {
        let Some(advance) = self.tracker.consume(event, label) else {
            return;
        };

        tracing::info!(
            split_number = advance.number,
            split = %advance.target,
            "Split completed"
        );
        self.activity_log
            .push(label, format!("Split '{}' Completed", advance.target));
        events::notify_timer_split(self.bridge.as_mut());

        if !advance.run_completed {
            return;
        }

        tracing::info!(split_count = self.tracker.targets().len(), "All splits completed");
        self.activity_log.push(label, "All Splits Completed");

        if self.settings.save_completed_runs {
            events::report_persistence_result(
                "completed run",
                write_completed_run(&self.settings.output_directory, &self.tracker.rows()),
            );
        }
    }
}
