pub mod language;
pub mod location;
pub mod sql;
