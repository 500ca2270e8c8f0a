//! The host-authoritative playback state machine.
//!
//! A room stores playback as an anchor: the position at the last
//! transition plus the instant it was recorded. While playing, the real
//! position is extrapolated from the anchor, so the actor never needs a
//! tick loop to keep time moving.
//!
//! ```text
//!            play                 pause
//!   Idle ─────────→ Playing ←──────────→ Paused
//!     ↑                 change_video        │
//!     └─────────── (empty url stays Idle) ──┘
//! ```

use std::time::Duration;

use tokio::time::Instant;
use watchparty_protocol::VideoRef;

use crate::RoomError;

/// Where playback stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No video selected.
    Idle,
    Paused,
    Playing,
}

/// A room's shared playback timeline.
#[derive(Debug, Clone)]
pub struct Playback {
    video: VideoRef,
    position: f64,
    is_playing: bool,
    anchored_at: Instant,
}

impl Playback {
    /// Creates a paused timeline at 0 for `video`.
    pub fn new(video: VideoRef) -> Self {
        Self {
            video,
            position: 0.0,
            is_playing: false,
            anchored_at: Instant::now(),
        }
    }

    pub fn state(&self) -> PlaybackState {
        if self.video.video_url.is_empty() {
            PlaybackState::Idle
        } else if self.is_playing {
            PlaybackState::Playing
        } else {
            PlaybackState::Paused
        }
    }

    pub fn video(&self) -> &VideoRef {
        &self.video
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// The position right now, in seconds.
    pub fn current_time(&self) -> f64 {
        self.current_time_at(Instant::now())
    }

    /// The position at `now`, in seconds.
    pub fn current_time_at(&self, now: Instant) -> f64 {
        if self.is_playing {
            self.position + now.saturating_duration_since(self.anchored_at).as_secs_f64()
        } else {
            self.position
        }
    }

    /// Starts (or re-anchors) playback at `time`.
    pub fn play(&mut self, time: f64) -> Result<(), RoomError> {
        self.anchor(check_time(time)?, true);
        Ok(())
    }

    /// Stops (or re-anchors) playback at `time`.
    pub fn pause(&mut self, time: f64) -> Result<(), RoomError> {
        self.anchor(check_time(time)?, false);
        Ok(())
    }

    /// Moves to `time`, keeping the play/pause state.
    ///
    /// Returns `false` when the jump is smaller than `epsilon` relative to
    /// the extrapolated position; the new anchor is still recorded, but the
    /// change is too small to be worth broadcasting.
    pub fn seek(&mut self, time: f64, epsilon: Duration) -> Result<bool, RoomError> {
        let time = check_time(time)?;
        let drift = (time - self.current_time()).abs();
        self.anchor(time, self.is_playing);
        Ok(drift >= epsilon.as_secs_f64())
    }

    /// Switches to a new video, paused at 0.
    pub fn change_video(&mut self, video: VideoRef) -> Result<(), RoomError> {
        if video.video_url.trim().is_empty() {
            return Err(RoomError::InvalidMessage("video url must not be empty".into()));
        }
        self.video = video;
        self.anchor(0.0, false);
        Ok(())
    }

    fn anchor(&mut self, position: f64, is_playing: bool) {
        self.position = position;
        self.is_playing = is_playing;
        self.anchored_at = Instant::now();
    }
}

fn check_time(time: f64) -> Result<f64, RoomError> {
    if time.is_finite() && time >= 0.0 {
        Ok(time)
    } else {
        Err(RoomError::InvalidMessage(format!("invalid playback time {time}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie() -> Playback {
        Playback::new(VideoRef::new("v1", "Movie"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_playback_is_paused_at_zero() {
        let playback = movie();
        assert_eq!(playback.state(), PlaybackState::Paused);
        assert_eq!(playback.current_time(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_video_url_is_idle() {
        let playback = Playback::new(VideoRef::new("", ""));
        assert_eq!(playback.state(), PlaybackState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_extrapolates_while_playing() {
        let mut playback = movie();
        playback.play(42.0).unwrap();
        assert_eq!(playback.state(), PlaybackState::Playing);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!((playback.current_time() - 45.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_position() {
        let mut playback = movie();
        playback.play(10.0).unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        playback.pause(15.0).unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(playback.current_time(), 15.0);
        assert!(!playback.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_small_jump_is_applied_but_coalesced() {
        let mut playback = movie();
        playback.pause(100.0).unwrap();
        let broadcast = playback.seek(100.4, Duration::from_secs(1)).unwrap();
        assert!(!broadcast);
        assert_eq!(playback.current_time(), 100.4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_compares_against_extrapolated_time() {
        let mut playback = movie();
        playback.play(0.0).unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;

        // 30.5 is within a second of where playback actually is.
        assert!(!playback.seek(30.5, Duration::from_secs(1)).unwrap());
        // 0.5 is not, even though it is close to the old anchor.
        assert!(playback.seek(0.5, Duration::from_secs(1)).unwrap());
        assert!(playback.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_negative_or_non_finite_time_is_rejected() {
        let mut playback = movie();
        assert!(matches!(playback.play(-1.0), Err(RoomError::InvalidMessage(_))));
        assert!(playback.seek(f64::NAN, Duration::from_secs(1)).is_err());
        assert!(playback.pause(f64::INFINITY).is_err());
        assert_eq!(playback.state(), PlaybackState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_video_resets_to_paused_zero() {
        let mut playback = movie();
        playback.play(500.0).unwrap();
        playback.change_video(VideoRef::new("v2", "Sequel")).unwrap();
        assert_eq!(playback.video().video_url, "v2");
        assert_eq!(playback.current_time(), 0.0);
        assert_eq!(playback.state(), PlaybackState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_video_rejects_empty_url() {
        let mut playback = movie();
        assert!(playback.change_video(VideoRef::new("  ", "Nothing")).is_err());
        assert_eq!(playback.video().video_url, "v1");
    }
}
