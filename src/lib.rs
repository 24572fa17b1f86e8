//! Small Basic interpreter
//!
//! Programs are parsed into a flat statement list and run by a cooperative
//! scheduler. Timer events start new logical threads that share the
//! program's global variables.

pub mod basic;
