//! Registration session state.

mod machine;

pub use machine::{Mode, SessionState};
