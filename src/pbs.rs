//! Generate PBS jobscripts

/// Validated job parameters and their defaulting rules
pub mod job_spec;

/// Render jobscript text from a job specification
pub mod script;
