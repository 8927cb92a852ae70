//! Point-in-time view of the player for diagnostics.

use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::pipeline::{MusicInfo, PlaybackState};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerStatus {
    pub state: PlaybackState,
    pub volume: u8,
    pub amp_enabled: bool,
    pub initialized: bool,
    pub now_playing: Option<String>,
    pub music_info: Option<MusicInfo>,
}

#[derive(Default)]
struct Track {
    url: Option<String>,
    info: Option<MusicInfo>,
}

/// Track details written by the worker and the engine event handler.
#[derive(Default)]
pub(crate) struct StatusBoard {
    track: Mutex<Track>,
}

impl StatusBoard {
    fn track(&self) -> MutexGuard<'_, Track> {
        self.track.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn started(&self, url: &str) {
        let mut t = self.track();
        t.url = Some(url.to_string());
        t.info = None;
    }

    pub(crate) fn music_info(&self, info: MusicInfo) {
        self.track().info = Some(info);
    }

    pub(crate) fn ended(&self) {
        self.track().url = None;
    }

    pub(crate) fn now_playing(&self) -> Option<String> {
        self.track().url.clone()
    }

    pub(crate) fn last_music_info(&self) -> Option<MusicInfo> {
        self.track().info
    }
}
