//! Speech synthesis: text cleanup, dialogue parsing, and the
//! orchestration that turns scripts into audio bytes.

pub mod sanitize;
pub mod synth;
pub mod turns;
