//! Pure constraint evaluation.
//!
//! `hard` answers "is this machine eligible" for a (possibly nested, possibly
//! grouped) hard-constraint tree against an attribute map; `soft` ranks
//! candidates by scored preferences. Both are pure: no I/O, no shared state,
//! deterministic given their inputs.

pub mod hard;
pub mod soft;
