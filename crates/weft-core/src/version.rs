//! Page versioning: reversible change records and the default undo
//! manager backing back-button support.

use std::collections::VecDeque;
use std::fmt;

use crate::component::{ComponentTree, DetachedComponent, Flags};
use crate::error::EngineError;
use crate::model::{Model, ModelValue};

/// One undoable mutation, captured as data. Undoing a version applies
/// its changes in reverse order.
pub enum Change {
    Visibility {
        path: String,
        prior: bool,
    },
    Enablement {
        path: String,
        prior: bool,
    },
    Model {
        path: String,
        prior: Option<Box<dyn ModelValue>>,
    },
    ModelReplaced {
        path: String,
        prior: Option<Model>,
    },
    Added {
        path: String,
    },
    Removed {
        parent_path: String,
        index: usize,
        subtree: DetachedComponent,
    },
}

impl Change {
    /// Restores the exact prior state this change captured.
    pub fn undo(self, tree: &mut ComponentTree) -> Result<(), EngineError> {
        match self {
            Change::Visibility { path, prior } => {
                let id = tree
                    .find(&path)
                    .ok_or(EngineError::MissingComponent { path })?;
                tree.get_mut(id)?.set_flag(Flags::VISIBLE, prior);
                Ok(())
            }
            Change::Enablement { path, prior } => {
                let id = tree
                    .find(&path)
                    .ok_or(EngineError::MissingComponent { path })?;
                tree.get_mut(id)?.set_flag(Flags::ENABLED, prior);
                Ok(())
            }
            Change::Model { path, prior } => {
                let id = tree
                    .find(&path)
                    .ok_or(EngineError::MissingComponent { path: path.clone() })?;
                let component = tree.get(id)?;
                let model = component
                    .model()
                    .ok_or(EngineError::MissingModel { path })?;
                match prior {
                    Some(value) => model.set_object(value),
                    None => model.clear_object(),
                }
                Ok(())
            }
            Change::ModelReplaced { path, prior } => {
                let id = tree
                    .find(&path)
                    .ok_or(EngineError::MissingComponent { path })?;
                tree.get_mut(id)?.set_model_raw(prior);
                Ok(())
            }
            Change::Added { path } => {
                // The undo of an add is a plain removal; a component
                // already gone is not an error during replay.
                if let Some(id) = tree.find(&path) {
                    tree.remove(id, false)?;
                }
                Ok(())
            }
            Change::Removed {
                parent_path,
                index,
                subtree,
            } => {
                let parent = tree.find(&parent_path).ok_or(EngineError::MissingComponent {
                    path: parent_path,
                })?;
                tree.insert_detached(parent, index, subtree)?;
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Visibility { path, prior } => {
                write!(f, "Visibility({path}, prior={prior})")
            }
            Change::Enablement { path, prior } => {
                write!(f, "Enablement({path}, prior={prior})")
            }
            Change::Model { path, prior } => write!(f, "Model({path}, prior={prior:?})"),
            Change::ModelReplaced { path, .. } => write!(f, "ModelReplaced({path})"),
            Change::Added { path } => write!(f, "Added({path})"),
            Change::Removed {
                parent_path, index, ..
            } => write!(f, "Removed({parent_path}[{index}])"),
        }
    }
}

/// Collaborator recording reversible per-request changes to a page.
pub trait VersionManager {
    fn begin_version(&mut self, merge: bool);
    fn end_version(&mut self, merge: bool);
    fn component_added(&mut self, change: Change) {
        self.component_state_changing(change);
    }
    fn component_removed(&mut self, change: Change) {
        self.component_state_changing(change);
    }
    fn component_model_changing(&mut self, change: Change) {
        self.component_state_changing(change);
    }
    fn component_state_changing(&mut self, change: Change);
    fn expire_oldest_version(&mut self);
    fn versions(&self) -> usize;
    fn current_version_number(&self) -> usize;
    fn ajax_version_number(&self) -> usize;
    /// Replays undo records until the page state matches `version`.
    fn undo_to(&mut self, version: usize, tree: &mut ComponentTree) -> Result<(), EngineError>;
}

struct VersionRecord {
    number: usize,
    changes: Vec<Change>,
}

/// Default in-memory manager: one change list per version, replayed in
/// reverse on undo. Retains at most `max_versions` versions.
pub struct UndoVersionManager {
    versions: VecDeque<VersionRecord>,
    active: Option<VersionRecord>,
    current: usize,
    ajax: usize,
    max_versions: usize,
}

impl UndoVersionManager {
    pub fn new(max_versions: usize) -> Self {
        UndoVersionManager {
            versions: VecDeque::new(),
            active: None,
            current: 0,
            ajax: 0,
            max_versions: max_versions.max(1),
        }
    }
}

impl VersionManager for UndoVersionManager {
    fn begin_version(&mut self, merge: bool) {
        if self.active.is_some() {
            return;
        }
        if merge {
            if let Some(last) = self.versions.pop_back() {
                self.ajax += 1;
                self.active = Some(last);
                return;
            }
        }
        self.active = Some(VersionRecord {
            number: self.current + 1,
            changes: Vec::new(),
        });
    }

    fn end_version(&mut self, _merge: bool) {
        if let Some(record) = self.active.take() {
            log::debug!(
                "closing page version {} with {} change(s)",
                record.number,
                record.changes.len()
            );
            self.current = record.number;
            self.versions.push_back(record);
            while self.versions.len() > self.max_versions {
                self.versions.pop_front();
            }
        }
    }

    fn component_state_changing(&mut self, change: Change) {
        let current = self.current;
        self.active
            .get_or_insert_with(|| VersionRecord {
                number: current + 1,
                changes: Vec::new(),
            })
            .changes
            .push(change);
    }

    fn expire_oldest_version(&mut self) {
        self.versions.pop_front();
    }

    fn versions(&self) -> usize {
        self.versions.len()
    }

    fn current_version_number(&self) -> usize {
        self.current
    }

    fn ajax_version_number(&self) -> usize {
        self.ajax
    }

    fn undo_to(&mut self, version: usize, tree: &mut ComponentTree) -> Result<(), EngineError> {
        if version > self.current {
            return Err(EngineError::NoVersion {
                requested: version,
                current: self.current,
            });
        }
        if let Some(open) = self.active.take() {
            for change in open.changes.into_iter().rev() {
                change.undo(tree)?;
            }
        }
        while self.current > version {
            let record = self.versions.pop_back().ok_or(EngineError::NoVersion {
                requested: version,
                current: self.current,
            })?;
            for change in record.changes.into_iter().rev() {
                change.undo(tree)?;
            }
            self.current = record.number.saturating_sub(1);
        }
        Ok(())
    }
}
