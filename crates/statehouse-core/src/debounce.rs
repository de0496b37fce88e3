// crates/statehouse-core/src/debounce.rs
// ============================================================================
// Module: Debounce Writer Runtime
// Description: Background runtime coalescing per-key debounced row writes.
// Purpose: Collapse rapid repeated singleton writes into one SQL statement
//          per key and execute it after a quiet period.
// Dependencies: crate::database, std::sync::mpsc, std::thread
// ============================================================================

//! ## Overview
//! The runtime is a dedicated named thread fed through an mpsc channel. Each
//! scheduled save carries a full-row UPDATE statement keyed by
//! `(table, key)`; scheduling a key that is already pending replaces the
//! statement and resets its deadline, so only the final value of a write
//! burst is ever persisted and at most one save per key is pending at any
//! time. Due statements execute when their deadline passes; `flush` executes
//! everything immediately; shutdown drains pending work before the thread
//! exits.
//!
//! Timer-fired execution failures have no caller to land on; they increment
//! the `failed_saves` counter and are otherwise dropped. This is the only
//! swallowed error path in the crate. Flush-driven execution reports its
//! first error to the flush caller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

use crate::database::Database;
use crate::database::DbError;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Save Keys and Statements
// ============================================================================

/// Identity of one debounced save series.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SaveKey {
    /// Physical table name.
    pub table: String,
    /// Caller-supplied row key.
    pub key: String,
}

/// Prepared full-row write awaiting execution.
#[derive(Debug, Clone)]
pub(crate) struct PendingStatement {
    /// Parameterized UPDATE text.
    pub sql: String,
    /// Positional bind values.
    pub params: Vec<SqlValue>,
}

/// Commands accepted by the runtime thread.
enum DebounceCommand {
    /// Schedule (or reschedule) a save for a key.
    Schedule {
        /// Save series identity.
        save_key: SaveKey,
        /// Full-row statement to execute when the deadline passes.
        statement: PendingStatement,
        /// Deadline computed at schedule time.
        deadline: Instant,
    },
    /// Execute every pending save immediately and report the outcome.
    Flush {
        /// Completion channel; carries the first execution error, if any.
        response: mpsc::Sender<Result<(), DbError>>,
    },
    /// Drain pending saves and stop the runtime.
    Shutdown,
}

// ============================================================================
// SECTION: Stats
// ============================================================================

/// Mutable debounce counters shared between the handle and the runtime.
#[derive(Debug, Default)]
struct DebounceStats {
    /// Saves scheduled (including reschedules).
    scheduled: u64,
    /// Schedules that replaced an already-pending save for the same key.
    coalesced: u64,
    /// Saves executed by deadline expiry.
    timer_saves: u64,
    /// Saves executed by an explicit flush (or shutdown drain).
    flush_saves: u64,
    /// Save executions that failed.
    failed_saves: u64,
}

/// Snapshot of debounce counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebounceStatsSnapshot {
    /// Saves scheduled (including reschedules).
    pub scheduled: u64,
    /// Schedules that replaced an already-pending save for the same key.
    pub coalesced: u64,
    /// Saves executed by deadline expiry.
    pub timer_saves: u64,
    /// Saves executed by an explicit flush (or shutdown drain).
    pub flush_saves: u64,
    /// Save executions that failed.
    pub failed_saves: u64,
}

// ============================================================================
// SECTION: Handle
// ============================================================================

/// Cloneable submission handle into the debounce runtime.
#[derive(Debug, Clone)]
pub(crate) struct DebounceHandle {
    /// Channel into the runtime thread.
    sender: mpsc::Sender<DebounceCommand>,
    /// Debounce quiet period.
    delay: Duration,
    /// Counters shared with the runtime.
    stats: Arc<Mutex<DebounceStats>>,
}

impl DebounceHandle {
    /// Schedules (or reschedules) a save; the deadline restarts from now.
    pub fn schedule(&self, save_key: SaveKey, statement: PendingStatement) {
        let command = DebounceCommand::Schedule {
            save_key,
            statement,
            deadline: Instant::now() + self.delay,
        };
        if self.sender.send(command).is_err() {
            record(&self.stats, |stats| stats.failed_saves = stats.failed_saves.saturating_add(1));
        }
    }

    /// Executes every pending save immediately.
    ///
    /// # Errors
    ///
    /// Returns the first execution error, or [`DbError::Db`] when the
    /// runtime is no longer available.
    pub fn flush(&self) -> Result<(), DbError> {
        let (response_tx, response_rx) = mpsc::channel();
        let command = DebounceCommand::Flush {
            response: response_tx,
        };
        if self.sender.send(command).is_err() {
            return Err(DbError::Db("debounce runtime unavailable".to_string()));
        }
        response_rx
            .recv()
            .map_err(|_| DbError::Db("debounce runtime response channel closed".to_string()))?
    }

    /// Requests runtime shutdown; pending saves drain before exit.
    pub fn shutdown(&self) {
        let _ = self.sender.send(DebounceCommand::Shutdown);
    }

    /// Returns a snapshot of the debounce counters.
    pub fn stats_snapshot(&self) -> DebounceStatsSnapshot {
        self.stats.lock().map_or_else(
            |_| DebounceStatsSnapshot::default(),
            |stats| DebounceStatsSnapshot {
                scheduled: stats.scheduled,
                coalesced: stats.coalesced,
                timer_saves: stats.timer_saves,
                flush_saves: stats.flush_saves,
                failed_saves: stats.failed_saves,
            },
        )
    }
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Spawns the debounce runtime thread for `database`.
///
/// # Errors
///
/// Returns [`DbError::Io`] when the thread cannot be spawned.
pub(crate) fn spawn_debounce_runtime<D: Database + 'static>(
    database: Arc<D>,
    delay: Duration,
) -> Result<DebounceHandle, DbError> {
    let (sender, receiver) = mpsc::channel();
    let stats = Arc::new(Mutex::new(DebounceStats::default()));
    let runtime_stats = Arc::clone(&stats);
    thread::Builder::new()
        .name("statehouse-debounce".to_string())
        .spawn(move || {
            debounce_loop(database.as_ref(), &receiver, &runtime_stats);
        })
        .map_err(|err| DbError::Io(format!("failed to spawn debounce thread: {err}")))?;
    Ok(DebounceHandle {
        sender,
        delay,
        stats,
    })
}

/// Runtime loop: waits for commands or the earliest pending deadline.
fn debounce_loop(
    database: &dyn Database,
    receiver: &mpsc::Receiver<DebounceCommand>,
    stats: &Arc<Mutex<DebounceStats>>,
) {
    let mut pending: HashMap<SaveKey, (Instant, PendingStatement)> = HashMap::new();
    loop {
        let command = match earliest_deadline(&pending) {
            None => match receiver.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    execute_due(database, &mut pending, stats);
                    continue;
                }
                match receiver.recv_timeout(deadline - now) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => {
                        execute_due(database, &mut pending, stats);
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        };
        match command {
            DebounceCommand::Schedule {
                save_key,
                statement,
                deadline,
            } => {
                let replaced = pending.insert(save_key, (deadline, statement)).is_some();
                record(stats, |stats| {
                    stats.scheduled = stats.scheduled.saturating_add(1);
                    if replaced {
                        stats.coalesced = stats.coalesced.saturating_add(1);
                    }
                });
            }
            DebounceCommand::Flush {
                response,
            } => {
                let result = execute_all(database, &mut pending, stats);
                let _ = response.send(result);
            }
            DebounceCommand::Shutdown => break,
        }
    }
    // Drain anything still pending so graceful shutdown never loses writes.
    let _ = execute_all(database, &mut pending, stats);
}

/// Returns the earliest deadline among pending saves.
fn earliest_deadline(pending: &HashMap<SaveKey, (Instant, PendingStatement)>) -> Option<Instant> {
    pending.values().map(|(deadline, _)| *deadline).min()
}

/// Executes every pending save whose deadline has passed.
fn execute_due(
    database: &dyn Database,
    pending: &mut HashMap<SaveKey, (Instant, PendingStatement)>,
    stats: &Arc<Mutex<DebounceStats>>,
) {
    let now = Instant::now();
    let due: Vec<SaveKey> = pending
        .iter()
        .filter(|(_, (deadline, _))| *deadline <= now)
        .map(|(save_key, _)| save_key.clone())
        .collect();
    for save_key in due {
        if let Some((_, statement)) = pending.remove(&save_key) {
            match database.execute(&statement.sql, &statement.params) {
                Ok(_) => record(stats, |stats| {
                    stats.timer_saves = stats.timer_saves.saturating_add(1);
                }),
                Err(_) => record(stats, |stats| {
                    stats.failed_saves = stats.failed_saves.saturating_add(1);
                }),
            }
        }
    }
}

/// Executes every pending save immediately; returns the first error.
fn execute_all(
    database: &dyn Database,
    pending: &mut HashMap<SaveKey, (Instant, PendingStatement)>,
    stats: &Arc<Mutex<DebounceStats>>,
) -> Result<(), DbError> {
    let mut first_error = None;
    for (_, (_, statement)) in pending.drain() {
        match database.execute(&statement.sql, &statement.params) {
            Ok(_) => record(stats, |stats| {
                stats.flush_saves = stats.flush_saves.saturating_add(1);
            }),
            Err(err) => {
                record(stats, |stats| {
                    stats.failed_saves = stats.failed_saves.saturating_add(1);
                });
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Applies a counter update, ignoring a poisoned stats mutex.
fn record(stats: &Arc<Mutex<DebounceStats>>, update: impl FnOnce(&mut DebounceStats)) {
    if let Ok(mut guard) = stats.lock() {
        update(&mut guard);
    }
}
