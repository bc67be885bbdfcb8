//! Undo/redo history on top of the table engine.
//!
//! The logging triggers (see [`trigger`]) append an inverse operation for
//! every mutation. An [`UndoSession`] groups those log entries into
//! intervals per `(table, scope)`, where the scope is the mutated row's
//! foreign key value, and replays them on undo and redo.
//!
//! Per scope the history moves through: clean, logged with an interval
//! open, interval sealed by [`UndoSession::barrier`] (undoable), interval
//! moved to the redo stack by [`UndoSession::undo`], and back again by
//! [`UndoSession::redo`].

use std::collections::HashMap;

use rusqlite::Connection;
use tracing::debug;

use crate::{error::Result, sql::engine::Table};

pub mod inverse;
pub mod trigger;

use inverse::{count_entries, delete_entries, load_entries, max_seq};

/// Foreign key value partitioning the history, `None` for scopeless tables
pub type Scope = Option<i64>;

/// Contiguous, inclusive range of log sequence numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub begin: i64,
    pub end: i64,
}

#[derive(Debug, Default)]
struct History {
    undo: Vec<Interval>,
    redo: Vec<Interval>,
    /// First sequence number of the interval currently being logged
    begin: Option<i64>,
}

/// Owns every undo/redo stack and the freeze mark of one editing session.
///
/// Single writer: the session assumes nothing else writes the database
/// between its calls in a way it should not see.
#[derive(Debug, Default)]
pub struct UndoSession {
    histories: HashMap<(&'static str, Scope), History>,
    frozen: Option<i64>,
}

impl UndoSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seals everything logged for `(table, scope)` since the previous
    /// barrier into one undoable interval. Returns whether an interval was
    /// pushed.
    ///
    /// The first barrier of a scope only records where its history starts:
    /// at the newest log entry, so the write just before it is part of the
    /// first interval.
    pub fn barrier(&mut self, table: &Table<'_>, scope: Scope) -> Result<bool> {
        let conn = table.connection();
        let mut end = max_seq(conn)?;
        if let Some(mark) = self.frozen {
            end = end.min(mark);
        }

        let history = self.histories.entry((table.name(), scope)).or_default();
        let Some(begin) = history.begin else {
            history.begin = Some(end);
            debug!(table = table.name(), ?scope, start = end, "undo history opened");
            return Ok(false);
        };

        let interval = Interval { begin, end };
        if begin > end || count_entries(conn, table.name(), scope, interval)? == 0 {
            return Ok(false);
        }

        history.undo.push(interval);
        history.redo.clear();
        history.begin = Some(end + 1);
        debug!(table = table.name(), ?scope, begin, end, "undo barrier");
        Ok(true)
    }

    /// Reverts the most recent interval of `(table, scope)`. Returns false
    /// when there is nothing to undo.
    pub fn undo(&mut self, table: &Table<'_>, scope: Scope) -> Result<bool> {
        self.step(table, scope, Direction::Undo)
    }

    /// Re-applies the most recently undone interval of `(table, scope)`.
    pub fn redo(&mut self, table: &Table<'_>, scope: Scope) -> Result<bool> {
        self.step(table, scope, Direction::Redo)
    }

    pub fn can_undo(&self, table: &Table<'_>, scope: Scope) -> bool {
        self.histories
            .get(&(table.name(), scope))
            .is_some_and(|h| !h.undo.is_empty())
    }

    pub fn can_redo(&self, table: &Table<'_>, scope: Scope) -> bool {
        self.histories
            .get(&(table.name(), scope))
            .is_some_and(|h| !h.redo.is_empty())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// Starts a window whose logging is discarded by [`Self::unfreeze`].
    ///
    /// # Panics
    ///
    /// When the session is already frozen.
    pub fn freeze(&mut self, conn: &Connection) -> Result<()> {
        if let Some(mark) = self.frozen {
            panic!("undo log already frozen at seq {}", mark);
        }
        let mark = max_seq(conn)?;
        self.frozen = Some(mark);
        debug!(mark, "undo log frozen");
        Ok(())
    }

    /// Deletes every log entry written since [`Self::freeze`]. The data
    /// changes themselves stay committed.
    ///
    /// # Panics
    ///
    /// When the session is not frozen.
    pub fn unfreeze(&mut self, conn: &Connection) -> Result<()> {
        let Some(mark) = self.frozen else {
            panic!("undo log is not frozen");
        };
        let sql = format!("DELETE FROM {} WHERE seq > ?", trigger::LOG_TABLE);
        let discarded = conn.execute(&sql, [mark])?;
        self.frozen = None;

        for history in self.histories.values_mut() {
            prune(&mut history.undo, mark);
            prune(&mut history.redo, mark);
        }
        debug!(mark, discarded, "undo log unfrozen");
        Ok(())
    }

    fn step(&mut self, table: &Table<'_>, scope: Scope, direction: Direction) -> Result<bool> {
        let Some(history) = self.histories.get_mut(&(table.name(), scope)) else {
            return Ok(false);
        };
        let (from, to) = match direction {
            Direction::Undo => (&mut history.undo, &mut history.redo),
            Direction::Redo => (&mut history.redo, &mut history.undo),
        };
        let Some(interval) = from.pop() else {
            return Ok(false);
        };

        match replay(table, scope, interval) {
            Ok((logged, end)) => {
                if let Some(logged) = logged {
                    to.push(logged);
                }
                history.begin = Some(end + 1);
                debug!(table = table.name(), ?scope, ?direction, ?interval, ?logged, "replayed");
                Ok(true)
            }
            Err(err) => {
                from.push(interval);
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Undo,
    Redo,
}

/// Executes the inverse operations of `interval` newest first, deletes the
/// consumed entries and returns the interval the replay itself logged
/// together with the log's new maximum sequence.
fn replay(table: &Table<'_>, scope: Scope, interval: Interval) -> Result<(Option<Interval>, i64)> {
    let tx = table.connection().unchecked_transaction()?;
    let inverses = load_entries(&tx, table.name(), scope, interval)?;
    let start = max_seq(&tx)? + 1;

    for inverse in inverses {
        inverse.executor(table.schema())?.execute(&tx)?;
    }
    delete_entries(&tx, table.name(), scope, interval)?;

    let end = max_seq(&tx)?;
    tx.commit()?;

    let logged = (end >= start).then_some(Interval { begin: start, end });
    Ok((logged, end))
}

/// Drops intervals lying entirely past `mark` and clamps the ones that
/// straddle it.
fn prune(stack: &mut Vec<Interval>, mark: i64) {
    stack.retain(|i| i.begin <= mark);
    for interval in stack.iter_mut() {
        interval.end = interval.end.min(mark);
    }
}
