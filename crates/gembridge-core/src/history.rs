//! Rolling context window over a session history.

use crate::message::{Role, Turn};

/// Build the outbound context for a model call from a full history.
///
/// The stored history is untouched; this only shapes what goes upstream.
/// The window always alternates strictly between user and model turns,
/// starts with a user turn, and holds at most `max_history` turns:
///
/// 1. take the newest `2 * max_history` turns,
/// 2. collapse each run of same-role turns to its first turn,
/// 3. drop a leading model turn,
/// 4. cap at the newest `max_history` turns, dropping a leading model
///    turn again if the cap exposed one.
pub fn context_window(history: &[Turn], max_history: usize) -> Vec<Turn> {
    let start = history.len().saturating_sub(2 * max_history);

    let mut window: Vec<Turn> = Vec::new();
    for turn in &history[start..] {
        match window.last() {
            Some(prev) if prev.role == turn.role => {}
            _ => window.push(turn.clone()),
        }
    }

    if window.first().is_some_and(|t| t.role == Role::Assistant) {
        window.remove(0);
    }

    if window.len() > max_history {
        window.drain(..window.len() - max_history);
        if window.first().is_some_and(|t| t.role == Role::Assistant) {
            window.remove(0);
        }
    }

    window
}
