use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::timeline::Timeline;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// One undoable edit, stored as the full timeline before and after.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    description: String,
    before: Timeline,
    after: Timeline,
}

impl Command {
    pub fn snapshot(description: impl Into<String>, before: &Timeline, after: &Timeline) -> Self {
        Self {
            description: description.into(),
            before: before.clone(),
            after: after.clone(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Undo/redo history of timeline snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandHistory {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    limit: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Keep at most `limit` undo steps; the oldest are dropped first.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Run an edit against a working copy of the timeline and record it.
    /// Nothing is recorded or committed if the edit fails or leaves the
    /// timeline invalid.
    pub fn execute<F, T>(&mut self, timeline: &mut Timeline, description: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Timeline) -> Result<T>,
    {
        let mut next = timeline.clone();
        let result = f(&mut next)?;
        next.validate()?;
        self.record(description, timeline, &next);
        *timeline = next;
        Ok(result)
    }

    /// Record an edit made elsewhere, e.g. with [`Timeline::apply`].
    pub fn record(&mut self, description: &str, before: &Timeline, after: &Timeline) {
        self.undo_stack.push(Command::snapshot(description, before, after));
        if self.undo_stack.len() > self.limit {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    /// Undo the last command, restoring the timeline to its previous state.
    pub fn undo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let cmd = self.undo_stack.pop().ok_or(CoreError::NothingToUndo)?;
        *timeline = cmd.before.clone();
        self.redo_stack.push(cmd);
        Ok(())
    }

    /// Redo the last undone command.
    pub fn redo(&mut self, timeline: &mut Timeline) -> Result<()> {
        let cmd = self.redo_stack.pop().ok_or(CoreError::NothingToRedo)?;
        *timeline = cmd.after.clone();
        self.undo_stack.push(cmd);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(|c| c.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.last().map(|c| c.description())
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
