use crate::snapshot::{InputSnapshot, Key, KeySet};
use glam::Vec2;

/// Accumulates raw window events between frames and hands out one
/// [`InputSnapshot`] per frame.
///
/// Held keys and the close flag persist across snapshots. Pointer position,
/// scroll and resize are per-frame and reset by [`InputCollector::take_snapshot`].
#[derive(Debug, Default)]
pub struct InputCollector {
    keys: KeySet,
    pointer: Option<Vec2>,
    pointer_reactivated: bool,
    scroll: f32,
    resize: Option<(u32, u32)>,
    close_requested: bool,
}

impl InputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&mut self, key: Key, pressed: bool) {
        if pressed {
            self.keys.insert(key);
        } else {
            self.keys.remove(key);
        }
    }

    /// Absolute pointer position in window coordinates. Only the latest sample
    /// per frame is kept.
    pub fn pointer_moved(&mut self, position: Vec2) {
        self.pointer = Some(position);
    }

    /// Relative pointer motion (raw device deltas), folded into a virtual
    /// absolute position so the camera sees a single coordinate stream.
    pub fn pointer_motion(&mut self, delta: Vec2, last_known: Vec2) {
        let base = self.pointer.unwrap_or(last_known);
        self.pointer = Some(base + delta);
    }

    /// Pointer control was (re)gained, e.g. focus returned or cursor recaptured.
    pub fn pointer_reactivated(&mut self) {
        self.pointer_reactivated = true;
        self.pointer = None;
    }

    /// Focus lost: drop held keys so movement does not continue in the background.
    pub fn focus_lost(&mut self) {
        self.keys = KeySet::new();
    }

    pub fn scroll(&mut self, lines: f32) {
        self.scroll += lines;
    }

    pub fn resized(&mut self, width: u32, height: u32) {
        self.resize = Some((width, height));
    }

    pub fn close_requested(&mut self) {
        self.close_requested = true;
    }

    pub fn take_snapshot(&mut self) -> InputSnapshot {
        let snapshot = InputSnapshot {
            keys: self.keys,
            pointer: self.pointer.take(),
            pointer_reactivated: std::mem::take(&mut self.pointer_reactivated),
            scroll: std::mem::take(&mut self.scroll),
            resize: self.resize.take(),
            close_requested: self.close_requested,
        };
        if snapshot.close_requested {
            tracing::debug!("close request carried in input snapshot");
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_keys_persist_across_snapshots() {
        let mut input = InputCollector::new();
        input.key(Key::Forward, true);
        assert!(input.take_snapshot().keys.contains(Key::Forward));
        assert!(input.take_snapshot().keys.contains(Key::Forward));
        input.key(Key::Forward, false);
        assert!(input.take_snapshot().keys.is_empty());
    }

    #[test]
    fn per_frame_fields_reset() {
        let mut input = InputCollector::new();
        input.pointer_moved(Vec2::new(10.0, 20.0));
        input.pointer_moved(Vec2::new(12.0, 21.0));
        input.scroll(1.0);
        input.scroll(0.5);
        input.resized(1024, 768);

        let first = input.take_snapshot();
        assert_eq!(first.pointer, Some(Vec2::new(12.0, 21.0)));
        assert_eq!(first.scroll, 1.5);
        assert_eq!(first.resize, Some((1024, 768)));

        let second = input.take_snapshot();
        assert_eq!(second.pointer, None);
        assert_eq!(second.scroll, 0.0);
        assert_eq!(second.resize, None);
    }

    #[test]
    fn relative_motion_accumulates_onto_last_position() {
        let mut input = InputCollector::new();
        input.pointer_motion(Vec2::new(3.0, -1.0), Vec2::new(100.0, 100.0));
        input.pointer_motion(Vec2::new(2.0, 1.0), Vec2::new(100.0, 100.0));
        assert_eq!(input.take_snapshot().pointer, Some(Vec2::new(105.0, 100.0)));
    }

    #[test]
    fn reactivation_flag_is_one_shot() {
        let mut input = InputCollector::new();
        input.pointer_reactivated();
        assert!(input.take_snapshot().pointer_reactivated);
        assert!(!input.take_snapshot().pointer_reactivated);
    }

    #[test]
    fn close_request_is_sticky() {
        let mut input = InputCollector::new();
        input.close_requested();
        assert!(input.take_snapshot().wants_exit());
        assert!(input.take_snapshot().wants_exit());
    }

    #[test]
    fn focus_loss_releases_keys() {
        let mut input = InputCollector::new();
        input.key(Key::StrafeRight, true);
        input.focus_lost();
        assert!(input.take_snapshot().keys.is_empty());
    }
}
