//! WebSocket upgrade handlers.
//!
//! Two distinct routes (spec.md §4.11, §6): [`events`] serves the typed
//! `SessionEvent` stream with resume-by-sequence semantics and
//! protocol-level keepalive; [`legacy`] serves the raw byte scrollback for
//! older clients that expect a PTY-shaped stream.

pub mod events;
pub mod legacy;
