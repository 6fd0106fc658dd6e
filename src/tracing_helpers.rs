//! Span constructors for migration and storage operations
//!
//! Callers enter the span for the duration of the operation:
//!
//! ```ignore
//! let _span = tracing_helpers::step_span(Direction::Up, "create_users").entered();
//! ```

use crate::migration::Direction;
use tracing::{info_span, Span};

/// Reconciling the tracking table against the plan
pub fn reconcile_span(table: &str) -> Span {
    info_span!("stepwise.reconcile", table = table)
}

/// Applying or reverting one migration
pub fn step_span(direction: Direction, migration: &str) -> Span {
    info_span!(
        "stepwise.step",
        direction = %direction,
        migration = migration
    )
}

/// Establishing a backend connection
pub fn connect_span() -> Span {
    info_span!("stepwise.connect")
}

pub fn begin_transaction_span() -> Span {
    info_span!("stepwise.transaction.begin")
}

pub fn commit_transaction_span() -> Span {
    info_span!("stepwise.transaction.commit")
}

pub fn rollback_transaction_span() -> Span {
    info_span!("stepwise.transaction.rollback")
}

/// Executing a statement; the statement text is truncated to keep spans small
pub fn execute_statement_span(statement: &str) -> Span {
    let statement = truncate(statement, 120);
    info_span!("stepwise.execute", statement = statement)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
