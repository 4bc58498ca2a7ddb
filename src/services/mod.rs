//! Operation implementations.
//!
//! Each function takes an `OpCtx` and enforces validation, authorization,
//! and state rules before touching storage. The `Engine` wraps these with
//! locking and timestamping.

pub mod archives;
pub mod meetings;
pub mod minutes;
pub mod rooms;
pub mod visibility;
