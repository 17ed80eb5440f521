#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use psyche::db;
use psyche::error::GenerationError;
use psyche::evolution::turns;
use psyche::evolution::types::{NewTurn, SenderClass, Turn};
use psyche::generation::TextGenerator;
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// A turn from the given sender class on the test platform.
pub fn new_turn(sender_class: SenderClass, content: &str) -> NewTurn {
    NewTurn {
        sender: match sender_class {
            SenderClass::Operator => "operator".into(),
            SenderClass::Federated => "peer-agent".into(),
            SenderClass::System => "system".into(),
        },
        sender_class,
        platform: "test".into(),
        content: content.into(),
        is_rejection: false,
    }
}

/// Insert `count` operator turns with a fixed score, bypassing live nudges.
pub fn insert_turns(conn: &Connection, content: &str, importance: f64, count: usize) -> Vec<Turn> {
    (0..count)
        .map(|_| {
            turns::insert_turn(conn, &new_turn(SenderClass::Operator, content), importance, 0.2).unwrap()
        })
        .collect()
}

/// Always answers with the same text.
pub struct FixedGenerator(pub String);

impl TextGenerator for FixedGenerator {
    fn generate(&self, _prompt: &str, _context: Option<&str>) -> Result<String, GenerationError> {
        Ok(self.0.clone())
    }

    fn model(&self) -> &str {
        "fixed"
    }
}

/// Succeeds for the first `ok_calls` calls, then times out.
pub struct FailAfter {
    pub ok_calls: usize,
    calls: AtomicUsize,
}

impl FailAfter {
    pub fn new(ok_calls: usize) -> Self {
        Self {
            ok_calls,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextGenerator for FailAfter {
    fn generate(&self, _prompt: &str, _context: Option<&str>) -> Result<String, GenerationError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.ok_calls {
            Ok(format!("summary {n}"))
        } else {
            Err(GenerationError::Timeout(5))
        }
    }

    fn model(&self) -> &str {
        "flaky"
    }
}
