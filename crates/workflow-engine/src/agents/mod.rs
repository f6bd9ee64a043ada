//! Agent contracts (spec component E): thin builder-pattern wrappers over a
//! [`Driver`](crate::driver::Driver) that know how to prompt for their role
//! and parse the typed result, grounded on `agents::coder`'s/
//! `agents::reviewer`'s builder pattern (env-tunable generation parameters
//! with documented defaults).

pub mod architect;
pub mod developer;
pub mod oracle;
pub mod reviewer;

pub use architect::Architect;
pub use developer::Developer;
pub use oracle::Oracle;
pub use reviewer::Reviewer;
