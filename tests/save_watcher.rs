use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use savewatch_lib::{
    DiffEvent, NoopTimerBridge, SaveEditor, SaveWatcher, SplitTarget, TickOutcome, TrackerStatus,
    WatchState, WatcherSettings,
};

struct SaveFixture {
    directory: PathBuf,
    save_path: PathBuf,
    mtime_seconds: u64,
}

impl SaveFixture {
    fn new(label: &str) -> Self {
        let timestamp_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_nanos())
            .unwrap_or(0);
        let process_id = std::process::id();
        let directory = std::env::temp_dir().join(format!(
            "savewatch_integration_{label}_{process_id}_{timestamp_nanos}"
        ));
        std::fs::create_dir_all(&directory)
            .expect("Failed to create temporary integration test directory");

        Self {
            save_path: directory.join("Saves.yaml"),
            directory,
            mtime_seconds: 1_700_000_000,
        }
    }

    fn settings(&self, splits: Vec<SplitTarget>) -> WatcherSettings {
        WatcherSettings {
            save_path: self.save_path.clone(),
            output_directory: self.directory.clone(),
            splits,
            ..WatcherSettings::default()
        }
    }

    /// Writes the document and moves its mtime forward so every write is observed.
    fn write(&mut self, contents: &str) {
        std::fs::write(&self.save_path, contents).expect("Failed to write test save file");
        self.bump_mtime();
    }

    fn bump_mtime(&mut self) {
        self.mtime_seconds += 10;
        let file = File::options()
            .write(true)
            .open(&self.save_path)
            .expect("Failed to open test save file");
        file.set_modified(UNIX_EPOCH + Duration::from_secs(self.mtime_seconds))
            .expect("Failed to set test save file mtime");
    }

    fn files_starting_with(&self, prefix: &str) -> Vec<PathBuf> {
        std::fs::read_dir(&self.directory)
            .expect("Failed to list test directory")
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(prefix))
                    .unwrap_or(false)
            })
            .collect()
    }
}

impl Drop for SaveFixture {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.directory);
    }
}

fn save_document(slots: &[String]) -> String {
    let mut document = String::from("saveDataSlots:\n");
    for slot in slots {
        document.push_str(slot);
    }
    document
}

fn slot(name: &str, minute: u32, blink: bool, cloak: bool, triggers: &[&str]) -> String {
    let mut slot = format!(
        "- version: 1.6\n  name: {name}\n  dateModified: 2024-03-02T18:{minute:02}:00.0000000+00:00\n  timeSpent: {}\n  respawnScene: Lumina Landed\n  respawnFacingRight: true\n  respawnPoint:\n    x: -117.5\n    y: 12\n  blinkUnlocked: {blink}\n  cloakUnlocked: {cloak}\n  triggersSet:\n",
        minute * 60
    );
    for trigger in triggers {
        slot.push_str(&format!("  - {trigger}\n"));
    }
    slot.push_str("  savedCharges: []\n");
    slot
}

fn stock_two_splits() -> Vec<SplitTarget> {
    vec![
        SplitTarget::new("blinkUnlocked", "true"),
        SplitTarget::new("cloakUnlocked", "true"),
    ]
}

#[test]
fn full_run_from_new_game_to_completed_splits() {
    let mut fixture = SaveFixture::new("full_run");
    let mut settings = fixture.settings(stock_two_splits());
    settings.save_activity_log = true;
    settings.save_completed_runs = true;
    let mut watcher = SaveWatcher::new(settings, Box::new(NoopTimerBridge));

    fixture.write(&save_document(&[]));
    assert_eq!(watcher.tick(), TickOutcome::FileLoaded { slot_count: 0 });
    assert_eq!(watcher.tick(), TickOutcome::Unchanged);

    fixture.write(&save_document(&[slot("Slot", 0, false, false, &["intro"])]));
    assert_eq!(watcher.tick(), TickOutcome::SlotAdded { index: 0 });

    fixture.write(&save_document(&[slot("Slot", 3, true, false, &["intro", "pinCollected_Blink"])]));
    let TickOutcome::SlotUpdated { index, events } = watcher.tick() else {
        panic!("Expected slot update");
    };
    assert_eq!(index, 0);
    assert!(events.contains(&DiffEvent::SetItemsChanged {
        key: "triggersSet".to_string(),
        added: vec!["pinCollected_Blink".to_string()],
        removed: Vec::new(),
    }));
    assert_eq!(
        watcher.tracker().status(),
        TrackerStatus::Active { position: 1 }
    );

    fixture.write(&save_document(&[slot("Slot", 7, true, true, &["intro", "pinCollected_Blink"])]));
    assert!(matches!(watcher.tick(), TickOutcome::SlotUpdated { .. }));
    assert_eq!(watcher.tracker().status(), TrackerStatus::Completed);

    let snapshot = watcher.snapshot();
    assert_eq!(snapshot.state, WatchState::SlotUpdated);
    assert_eq!(snapshot.slot_number, Some(1));
    assert_eq!(snapshot.real_time.as_deref(), Some("0:07:00.000"));
    assert_eq!(
        snapshot
            .active_slot
            .as_ref()
            .and_then(|summary| summary.respawn_scene.as_deref()),
        Some("Lumina Landed")
    );
    assert_eq!(snapshot.splits[1].duration.as_deref(), Some("0:07:00.000"));

    let log_contents = std::fs::read_to_string(watcher.episode_log_path())
        .expect("Expected episode log to be written");
    assert!(log_contents.starts_with("New Game started at 2024-03-02 18:00:00"));
    assert!(log_contents.contains("[0:03:00.000] triggersSet: +pinCollected_Blink"));
    assert!(log_contents.contains("[0:07:00.000] Split 'cloakUnlocked: true' Completed"));
    assert!(log_contents.contains("All Splits Completed"));

    let run_files = fixture.files_starting_with("Completed_Run_");
    assert_eq!(run_files.len(), 1);
    let run_contents =
        std::fs::read_to_string(&run_files[0]).expect("Expected completed run export");
    assert_eq!(
        run_contents,
        "1|blinkUnlocked: true|0:03:00.000\n2|cloakUnlocked: true|0:07:00.000\n"
    );
}

#[test]
fn deleting_a_slot_reports_its_original_index() {
    let mut fixture = SaveFixture::new("delete");
    let mut watcher = SaveWatcher::new(fixture.settings(Vec::new()), Box::new(NoopTimerBridge));

    fixture.write(&save_document(&[
        slot("First", 1, false, false, &[]),
        slot("Second", 2, false, false, &[]),
        slot("Third", 3, false, false, &[]),
    ]));
    watcher.tick();

    fixture.write(&save_document(&[
        slot("First", 1, false, false, &[]),
        slot("Third", 3, false, false, &[]),
    ]));
    assert_eq!(watcher.tick(), TickOutcome::SlotRemoved { index: 1 });
    assert_eq!(watcher.state(), WatchState::SlotDeleted);
    assert!(watcher.activity_log().is_empty());
}

#[test]
fn truncated_write_is_retried_on_the_next_tick() {
    let mut fixture = SaveFixture::new("truncated");
    let mut watcher = SaveWatcher::new(fixture.settings(Vec::new()), Box::new(NoopTimerBridge));

    fixture.write(&save_document(&[slot("Slot", 1, false, false, &[])]));
    watcher.tick();

    fixture.write("saveDataSlots:\n- name: [Slot\n");
    assert!(matches!(watcher.tick(), TickOutcome::LoadFailed { .. }));

    std::fs::write(
        &fixture.save_path,
        save_document(&[slot("Hero", 1, false, false, &[])]),
    )
    .expect("Failed to finish test save write");
    let mtime = UNIX_EPOCH + Duration::from_secs(fixture.mtime_seconds);
    File::options()
        .write(true)
        .open(&fixture.save_path)
        .and_then(|file| file.set_modified(mtime))
        .expect("Failed to keep test save file mtime");

    let TickOutcome::SlotUpdated { events, .. } = watcher.tick() else {
        panic!("Expected slot update after completed write");
    };
    assert_eq!(
        events,
        vec![DiffEvent::FieldChanged {
            key: "name".to_string(),
            new_value: "Hero".to_string(),
        }]
    );
}

#[test]
fn editor_writes_are_adopted_silently() {
    let mut fixture = SaveFixture::new("editor");
    let mut watcher = SaveWatcher::new(
        fixture.settings(vec![SplitTarget::new("blinkUnlocked", "true")]),
        Box::new(NoopTimerBridge),
    );

    fixture.write(&save_document(&[slot("Slot", 0, false, false, &["intro"])]));
    watcher.tick();

    let editor = SaveEditor::new(fixture.save_path.clone(), watcher.edit_signal());
    let mut save_file = editor.load().expect("Expected editor to load save file");
    let edited_slot = save_file
        .slots_mut()
        .first_mut()
        .expect("Expected a slot to edit");
    *edited_slot = edited_slot
        .clone()
        .with_scalar("blinkUnlocked", savewatch_lib::save_file::Scalar::Bool(true));
    editor
        .write(&mut save_file)
        .expect("Expected editor write to succeed");
    fixture.bump_mtime();

    assert_eq!(watcher.tick(), TickOutcome::SelfEditAdopted);
    assert!(watcher.activity_log().is_empty());
    assert_eq!(
        watcher.tracker().status(),
        TrackerStatus::Active { position: 0 }
    );

    let written = std::fs::read_to_string(&fixture.save_path).expect("Expected edited save");
    assert!(written.contains("dateModified: 2024-03-02T18:00:00.0000000+00:00"));
    assert!(written.contains("blinkUnlocked: true"));

    let reloaded = editor.load().expect("Expected edited save to parse");
    let reloaded_slot = reloaded.slot(0).expect("Expected edited slot");
    assert_eq!(reloaded_slot.flag("blinkUnlocked"), Some(true));
    assert_eq!(reloaded_slot.respawn_point(), Some((-117.5, 12.0)));
}

#[test]
fn missing_save_file_halts_the_watcher() {
    let fixture = SaveFixture::new("missing");
    let mut watcher = SaveWatcher::new(fixture.settings(Vec::new()), Box::new(NoopTimerBridge));

    assert_eq!(watcher.tick(), TickOutcome::NoSaveFile);
    assert_eq!(watcher.tick(), TickOutcome::Halted);
    assert_eq!(watcher.snapshot().state, WatchState::NoSaveFile);
    assert!(!Path::new(&fixture.save_path).exists());
}
