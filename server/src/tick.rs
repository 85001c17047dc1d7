use log::{debug, error, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};

use crate::game::{GameCommand, GameState};
use crate::hub::HubEvent;
use shared::encode_frame;

/// Runs the fixed-period snapshot loop: drain pending commands, advance
/// the world by the measured wall-clock delta, and hand the encoded frame
/// to the hub. The handoff never blocks; if the hub cannot take the frame
/// this tick is dropped and the next one supersedes it.
pub async fn run_tick_loop(
    mut state: GameState,
    mut commands: mpsc::Receiver<GameCommand>,
    hub_tx: mpsc::Sender<HubEvent>,
    tick_rate: u32,
) {
    let mut interval_timer = interval(Duration::from_secs_f32(1.0 / tick_rate as f32));
    interval_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut last_update = Instant::now();

    // Cap the delta so a stalled process doesn't teleport entities
    let max_delta_time = 1.0 / 20.0;

    // Skip the first tick since it fires immediately
    interval_timer.tick().await;

    loop {
        interval_timer.tick().await;

        let current_time = Instant::now();
        let mut delta_time = (current_time - last_update).as_secs_f32();
        last_update = current_time;

        if delta_time > max_delta_time {
            warn!(
                "Large delta time detected ({:.3}s), capping to {:.3}s",
                delta_time, max_delta_time
            );
            delta_time = max_delta_time;
        }

        while let Ok(cmd) = commands.try_recv() {
            state.apply_command(cmd);
        }

        state.step(delta_time);

        let payload = match bincode::serialize(&state.snapshot()) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize snapshot: {}", e);
                continue;
            }
        };

        let frame = match encode_frame(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Snapshot does not fit in a frame: {}", e);
                continue;
            }
        };

        match hub_tx.try_send(HubEvent::Broadcast { frame }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!("Hub event queue full, dropping this tick's frame")
            }
            Err(TrySendError::Closed(_)) => break,
        }
    }
}
