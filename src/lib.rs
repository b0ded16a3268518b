//! Periodic extraction of numeric fields from text and binary files.
//!
//! Fields are declared as `name:datatype@path+params`, activated by name, and
//! sampled by a background worker at a fixed interval. Each field keeps a
//! run-length compressed time series: a new sample is stored only when the
//! value changes, repeats just bump an observation counter. The host drains
//! each series on its own schedule.

pub mod clock;
pub mod codec;
pub mod collector;
pub mod config;
pub mod error;
pub mod field;
pub mod registry;
pub mod scan;
pub mod source;
pub mod stats;
pub mod timeseries;

pub use clock::{Clock, QuantaClock, SystemClock};
pub use codec::{BinaryType, Datatype, RawValue, Value};
pub use collector::Collector;
pub use config::CollectorConfig;
pub use error::{Error, Result};
pub use field::{DisplayMode, FieldId, FieldMetadata, FieldSpec};
pub use registry::Registry;
pub use scan::{ExtractedValue, Scanner};
pub use source::Source;
pub use stats::CycleStats;
pub use timeseries::{Sample, TimeSeriesLog};
