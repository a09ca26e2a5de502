//! Shell-style command history.
//!
//! Entries are stored newest first. The cursor is `None` while the operator
//! is editing fresh input and `Some(i)` while browsing entry `i`.

/// Which way to move through history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward earlier commands (arrow up)
    Older,
    /// Back toward the empty prompt (arrow down)
    Newer,
}

/// What the input line should show after a navigation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryStep {
    /// Replace the input with this entry
    Load(String),
    /// Back at the fresh prompt; empty the input
    Clear,
    /// Nothing to do
    Stay,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<String>,
    cursor: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submitted command and stop browsing.
    pub fn push(&mut self, command: impl Into<String>) {
        self.entries.insert(0, command.into());
        self.cursor = None;
    }

    pub fn navigate(&mut self, direction: Direction) -> HistoryStep {
        match direction {
            Direction::Older => {
                let next = self.cursor.map_or(0, |c| c + 1);
                if next < self.entries.len() {
                    self.cursor = Some(next);
                    HistoryStep::Load(self.entries[next].clone())
                } else {
                    HistoryStep::Stay
                }
            }
            Direction::Newer => match self.cursor {
                Some(0) => {
                    self.cursor = None;
                    HistoryStep::Clear
                }
                Some(c) => {
                    self.cursor = Some(c - 1);
                    HistoryStep::Load(self.entries[c - 1].clone())
                }
                None => HistoryStep::Stay,
            },
        }
    }

    /// Entries, newest first.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}
