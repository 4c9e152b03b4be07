use std::sync::Arc;

use tracing::info;

use crate::media::{MediaId, MediaStore, UNITY_VOLUME};

/// An undoable unit of state mutation.
pub trait Action: Send {
    /// Perform the mutation (the "do" step).
    fn apply(&mut self);
    fn undo(&mut self);
    fn redo(&mut self);
    fn describe(&self) -> String;
}

/// One volume change: the entry, the volume to set, and the volume it had
/// when the change was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAdjustment {
    pub entry: MediaId,
    pub new_volume: f64,
    pub old_volume: f64,
}

/// Batch change of media entry volumes.
pub struct VolumeAdjustmentAction {
    store: Arc<dyn MediaStore>,
    adjustments: Vec<PendingAdjustment>,
    description: String,
}

impl VolumeAdjustmentAction {
    pub fn new(store: Arc<dyn MediaStore>) -> Self {
        Self {
            store,
            adjustments: Vec::new(),
            description: "Replay gain volume adjusted".to_string(),
        }
    }

    /// An action that puts every given entry back to unity gain.
    pub fn reset<'a>(store: Arc<dyn MediaStore>, entries: impl IntoIterator<Item = &'a MediaId>) -> Self {
        let mut action = Self::new(store);
        action.description = "Replay gain volume reset".to_string();
        for entry in entries {
            action.add_media(entry, UNITY_VOLUME);
        }
        action
    }

    /// Record a new volume for `entry`, capturing its current volume now.
    ///
    /// Returns `false` (and records nothing) if the entry has no volume control.
    pub fn add_media(&mut self, entry: &str, new_volume: f64) -> bool {
        match self.store.volume_control(entry) {
            Some(control) => {
                self.adjustments.push(PendingAdjustment {
                    entry: entry.to_string(),
                    new_volume,
                    old_volume: control.get(),
                });
                true
            }
            None => false,
        }
    }

    pub fn adjustments(&self) -> &[PendingAdjustment] {
        &self.adjustments
    }

    pub fn len(&self) -> usize {
        self.adjustments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjustments.is_empty()
    }

    fn set_volumes(&self, pick: impl Fn(&PendingAdjustment) -> f64) {
        for adjustment in &self.adjustments {
            // Entries removed since recording are skipped
            if let Some(control) = self.store.volume_control(&adjustment.entry) {
                control.set(pick(adjustment));
            }
        }
    }
}

impl Action for VolumeAdjustmentAction {
    fn apply(&mut self) {
        self.set_volumes(|a| a.new_volume);
    }

    fn undo(&mut self) {
        self.set_volumes(|a| a.old_volume);
    }

    fn redo(&mut self) {
        self.apply();
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Undo/redo stacks of committed actions.
#[derive(Default)]
pub struct ActionHistory {
    done: Vec<Box<dyn Action>>,
    undone: Vec<Box<dyn Action>>,
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `action` and record it. Clears anything that could be redone.
    pub fn commit(&mut self, mut action: Box<dyn Action>) {
        action.apply();
        info!(action = %action.describe(), "action committed");
        self.done.push(action);
        self.undone.clear();
    }

    pub fn undo(&mut self) -> Option<String> {
        let mut action = self.done.pop()?;
        action.undo();
        let description = action.describe();
        info!(action = %description, "action undone");
        self.undone.push(action);
        Some(description)
    }

    pub fn redo(&mut self) -> Option<String> {
        let mut action = self.undone.pop()?;
        action.redo();
        let description = action.describe();
        info!(action = %description, "action redone");
        self.done.push(action);
        Some(description)
    }

    pub fn can_undo(&self) -> bool {
        !self.done.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.undone.is_empty()
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{EntryRecord, Session};

    fn session(volumes: &[(&str, Option<f64>)]) -> Arc<Session> {
        Arc::new(Session::from_records(
            volumes
                .iter()
                .map(|(id, volume)| EntryRecord {
                    id: id.to_string(),
                    uri: Some(format!("file:///{}.wav", id)),
                    volume: *volume,
                })
                .collect(),
        ))
    }

    #[test]
    fn test_old_volume_captured_at_add_time() {
        let store = session(&[("a", Some(0.4))]);
        let mut action = VolumeAdjustmentAction::new(store.clone());
        assert!(action.add_media("a", 1.2));

        // A later change elsewhere must not leak into the recorded old volume
        store.volume_control("a").unwrap().set(0.9);
        action.apply();
        assert_eq!(store.volume_of("a"), Some(1.2));
        action.undo();
        assert_eq!(store.volume_of("a"), Some(0.4));
    }

    #[test]
    fn test_entry_without_volume_is_not_added() {
        let store = session(&[("a", None), ("b", Some(1.0))]);
        let mut action = VolumeAdjustmentAction::new(store);
        assert!(!action.add_media("a", 2.0));
        assert!(!action.add_media("missing", 2.0));
        assert!(action.add_media("b", 2.0));
        assert_eq!(action.len(), 1);
    }

    #[test]
    fn test_apply_undo_redo_exact() {
        let store = session(&[("a", Some(0.3)), ("b", Some(0.7))]);
        let mut action = VolumeAdjustmentAction::new(store.clone());
        action.add_media("a", 1.4125375446227544);
        action.add_media("b", 0.7981049249829813);

        action.apply();
        action.apply();
        assert_eq!(store.volume_of("a"), Some(1.4125375446227544));
        assert_eq!(store.volume_of("b"), Some(0.7981049249829813));

        action.undo();
        assert_eq!(store.volume_of("a"), Some(0.3));
        assert_eq!(store.volume_of("b"), Some(0.7));

        action.redo();
        assert_eq!(store.volume_of("a"), Some(1.4125375446227544));
        assert_eq!(store.volume_of("b"), Some(0.7981049249829813));
    }

    #[test]
    fn test_removed_entry_is_skipped() {
        let store = session(&[("a", Some(0.5)), ("b", Some(0.5))]);
        let mut action = VolumeAdjustmentAction::new(store.clone());
        action.add_media("a", 2.0);
        action.add_media("b", 2.0);
        store.remove("a");

        action.apply();
        assert_eq!(store.volume_of("a"), None);
        assert_eq!(store.volume_of("b"), Some(2.0));
    }

    #[test]
    fn test_reset_sets_unity() {
        let store = session(&[("a", Some(0.5)), ("b", Some(3.0)), ("c", None)]);
        let ids: Vec<MediaId> = vec!["a".into(), "b".into(), "c".into()];
        let mut action = VolumeAdjustmentAction::reset(store.clone(), &ids);
        assert_eq!(action.len(), 2);
        assert!(action.adjustments().iter().all(|a| a.new_volume == UNITY_VOLUME));
        assert_eq!(action.describe(), "Replay gain volume reset");

        action.apply();
        assert_eq!(store.volume_of("a"), Some(1.0));
        assert_eq!(store.volume_of("b"), Some(1.0));
        action.undo();
        assert_eq!(store.volume_of("b"), Some(3.0));
    }

    #[test]
    fn test_history_commit_undo_redo() {
        let store = session(&[("a", Some(1.0))]);
        let mut history = ActionHistory::new();
        assert_eq!(history.undo(), None);

        let mut action = VolumeAdjustmentAction::new(store.clone());
        action.add_media("a", 0.25);
        history.commit(Box::new(action));
        assert_eq!(store.volume_of("a"), Some(0.25));
        assert!(history.can_undo());

        assert_eq!(history.undo().as_deref(), Some("Replay gain volume adjusted"));
        assert_eq!(store.volume_of("a"), Some(1.0));
        assert!(history.can_redo());

        assert!(history.redo().is_some());
        assert_eq!(store.volume_of("a"), Some(0.25));
        assert_eq!(history.redo(), None);
    }

    #[test]
    fn test_commit_clears_redo() {
        let store = session(&[("a", Some(1.0))]);
        let mut history = ActionHistory::new();
        history.commit(Box::new(VolumeAdjustmentAction::reset(store.clone(), &["a".to_string()])));
        history.undo();
        assert!(history.can_redo());
        history.commit(Box::new(VolumeAdjustmentAction::new(store)));
        assert!(!history.can_redo());
        assert_eq!(history.len(), 1);
    }
}
