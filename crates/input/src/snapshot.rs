use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Logical keys the render loop reacts to. The windowing layer maps physical keys onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Forward,
    Backward,
    StrafeLeft,
    StrafeRight,
    Exit,
}

impl Key {
    const fn bit(self) -> u8 {
        match self {
            Key::Forward => 1 << 0,
            Key::Backward => 1 << 1,
            Key::StrafeLeft => 1 << 2,
            Key::StrafeRight => 1 << 3,
            Key::Exit => 1 << 4,
        }
    }
}

/// Set of logical keys currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySet(u8);

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: Key) -> Self {
        self.insert(key);
        self
    }

    pub fn insert(&mut self, key: Key) {
        self.0 |= key.bit();
    }

    pub fn remove(&mut self, key: Key) {
        self.0 &= !key.bit();
    }

    pub fn contains(&self, key: Key) -> bool {
        self.0 & key.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Everything the render loop needs to know about input for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    /// Keys held at the time of the snapshot.
    pub keys: KeySet,
    /// Latest absolute pointer position, if the pointer moved this frame.
    pub pointer: Option<Vec2>,
    /// Pointer control was (re)acquired since the last snapshot; the next
    /// pointer sample only establishes a baseline.
    pub pointer_reactivated: bool,
    /// Accumulated scroll in lines, positive away from the user.
    pub scroll: f32,
    /// New surface size, if the surface was resized this frame.
    pub resize: Option<(u32, u32)>,
    /// The platform asked the window to close.
    pub close_requested: bool,
}

impl InputSnapshot {
    /// True when the loop must stop after this frame.
    pub fn wants_exit(&self) -> bool {
        self.close_requested || self.keys.contains(Key::Exit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_set_insert_remove() {
        let mut keys = KeySet::new().with(Key::Forward).with(Key::StrafeLeft);
        assert!(keys.contains(Key::Forward));
        assert!(keys.contains(Key::StrafeLeft));
        assert!(!keys.contains(Key::Backward));
        keys.remove(Key::Forward);
        assert!(!keys.contains(Key::Forward));
        keys.remove(Key::StrafeLeft);
        assert!(keys.is_empty());
    }

    #[test]
    fn exit_key_or_close_request_ends_loop() {
        let mut snap = InputSnapshot::default();
        assert!(!snap.wants_exit());
        snap.keys.insert(Key::Exit);
        assert!(snap.wants_exit());

        let closing = InputSnapshot {
            close_requested: true,
            ..InputSnapshot::default()
        };
        assert!(closing.wants_exit());
    }
}
