pub mod activity_log;
pub mod diff;
pub mod persistence;
pub mod save_file;
pub mod settings;
pub mod splits;
pub mod timer_bridge;
pub mod watcher;

pub use activity_log::{ActivityLine, ActivityLog};
pub use diff::{classify_slot_update, locate_slot_transition, DiffEvent, ElapsedTimes, SlotTransition};
pub use save_file::{SaveEditor, SaveFile, SaveSlot, SnapshotError};
pub use settings::WatcherSettings;
pub use splits::{SplitTarget, SplitsTracker, TrackerState, TrackerStatus};
pub use timer_bridge::{NoopTimerBridge, TimerBridge, TracingTimerBridge};
pub use watcher::{
    spawn_watcher, EditSignal, SaveWatcher, TickOutcome, WatchState, WatcherHandle,
    WatcherSnapshot,
};

/// How the binary presents watcher output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    ActivityLines,
    Json,
}

/// Runs the watcher until Ctrl-C, printing each new activity line or snapshot.
pub async fn run(settings: WatcherSettings, output_mode: OutputMode) -> Result<(), String> {
    let handle = spawn_watcher(settings, Box::new(TracingTimerBridge::default()));
    let mut snapshot_rx = handle.subscribe();
    let mut printed_lines: Vec<ActivityLine> = Vec::new();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    tracing::warn!("Failed to listen for Ctrl-C: {error}");
                }
                break;
            }
            changed = snapshot_rx.changed() => {
                if changed.is_err() {
                    tracing::warn!("Save watcher exited unexpectedly");
                    break;
                }

                let snapshot = snapshot_rx.borrow_and_update().clone();
                print_snapshot(&snapshot, output_mode, &mut printed_lines)?;
            }
        }
    }

    handle.stop().await
}

fn print_snapshot(
    snapshot: &WatcherSnapshot,
    output_mode: OutputMode,
    printed_lines: &mut Vec<ActivityLine>,
) -> Result<(), String> {
    match output_mode {
        OutputMode::Json => {
            let serialized = serde_json::to_string(snapshot)
                .map_err(|error| format!("Failed to serialize watcher snapshot: {error}"))?;
            println!("{serialized}");
        }
        OutputMode::ActivityLines => {
            let continues_episode = snapshot.activity.starts_with(printed_lines.as_slice());
            let new_lines = if continues_episode {
                &snapshot.activity[printed_lines.len()..]
            } else {
                &snapshot.activity[..]
            };

            for line in new_lines {
                println!("{line}");
            }
            *printed_lines = snapshot.activity.clone();
        }
    }

    Ok(())
}
