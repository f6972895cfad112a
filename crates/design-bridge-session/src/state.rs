//! Per-session state shared by the invoker and HTTP handlers.

use std::sync::OnceLock;

/// Holds the id of the first root frame created in a session.
///
/// The slot is written at most once; later frame creations leave it alone.
/// A restart builds a fresh `SessionState`.
#[derive(Debug, Default)]
pub struct SessionState {
    root_frame_id: OnceLock<String>,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Root frame id, if one has been created in this session.
    #[must_use]
    pub fn get_root_id(&self) -> Option<String> {
        self.root_frame_id.get().cloned()
    }

    /// Record `id` unless a root frame is already known. Returns whether this
    /// call set it.
    pub(crate) fn set_root_id_if_absent(&self, id: String) -> bool {
        self.root_frame_id.set(id).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn first_writer_wins() {
        let state = SessionState::new();
        assert_eq!(state.get_root_id(), None);
        assert!(state.set_root_id_if_absent("1:2".into()));
        assert!(!state.set_root_id_if_absent("3:4".into()));
        assert_eq!(state.get_root_id().as_deref(), Some("1:2"));
    }

    #[test]
    fn racing_writers_leave_exactly_one_id() {
        let state = Arc::new(SessionState::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let state = Arc::clone(&state);
                thread::spawn(move || state.set_root_id_if_absent(format!("{i}:0")))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
        assert!(state.get_root_id().unwrap().ends_with(":0"));
    }
}
