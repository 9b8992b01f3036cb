pub mod host;
pub mod spec;
