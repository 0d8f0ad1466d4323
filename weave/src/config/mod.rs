//! Configuration for a container, loaded from YAML or JSON in two stages:
//! `raw` mirrors the file layout, `processed` is the validated form the
//! container consumes.

pub mod processed;
pub mod raw;

pub use processed::WeaveConfig;
