//! Playback worker.
//!
//! Single consumer of the command channel. Each command runs under the
//! playback-session lock, so the direct PCM path never interleaves with a
//! track change.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use crate::command::{Command, MediaUrl};
use crate::media::strip_scheme;
use crate::pipeline::PlaybackState;
use crate::player::Shared;

/// Spawn the worker thread draining `cmd_rx`.
pub(crate) fn spawn_worker(
    shared: Arc<Shared>,
    cmd_rx: Receiver<Command>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("audio-player".to_string())
        .spawn(move || worker_main(&shared, cmd_rx))
}

/// Main command loop.
fn worker_main(shared: &Shared, cmd_rx: Receiver<Command>) {
    tracing::debug!("worker started");
    while let Ok(cmd) = cmd_rx.recv() {
        let _session = shared.session();
        tracing::debug!(cmd = cmd.name(), "command");
        match cmd {
            Command::Play(url) => handle_play(shared, &url),
            Command::Stop => handle_stop(shared),
            Command::Pause => handle_pause(shared),
            Command::Resume => handle_resume(shared),
            Command::Deinit => {
                teardown(shared);
                tracing::info!("player deinitialized");
                return;
            }
        }
    }
    // Every sender dropped without an explicit Deinit.
    let _session = shared.session();
    teardown(shared);
    tracing::info!("command channel closed; player torn down");
}

fn handle_play(shared: &Shared, url: &MediaUrl) {
    shared.amp.disable();
    {
        let mut pipeline = shared.pipeline();
        pipeline.stop();
    }
    close_media(shared);

    let path = Path::new(strip_scheme(url.as_str()));
    if let Err(e) = shared.bus.with(|| shared.media.open(path)) {
        tracing::debug!(path = %path.display(), "media open failed: {e}");
        shared.status.ended();
        return;
    }

    shared.status.started(url.as_str());
    let run = shared.pipeline().run(url.as_str());
    match run {
        Ok(()) => {
            shared.amp.enable();
            tracing::info!(url = %url, "playing");
        }
        Err(e) => {
            tracing::warn!(url = %url, "pipeline run failed: {e:#}");
            close_media(shared);
            shared.status.ended();
        }
    }
}

fn handle_stop(shared: &Shared) {
    shared.pipeline().stop();
    close_media(shared);
    shared.amp.disable();
    shared.status.ended();
    tracing::info!("stopped");
}

fn handle_pause(shared: &Shared) {
    shared.amp.disable();
    shared.pipeline().pause();
}

fn handle_resume(shared: &Shared) {
    let mut pipeline = shared.pipeline();
    pipeline.resume();
    if pipeline.state() == PlaybackState::Running {
        shared.amp.enable();
    }
}

/// Release everything `init` acquired.
fn teardown(shared: &Shared) {
    shared.amp.disable();
    shared.amp.release();
    close_media(shared);
    shared.pipeline().destroy();
    shared.status.ended();
    shared.initialized.store(false, Ordering::SeqCst);
}

fn close_media(shared: &Shared) {
    shared.bus.with(|| shared.media.close());
}
