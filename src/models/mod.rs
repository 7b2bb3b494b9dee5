pub mod hourly;
pub mod live;
pub mod observation;

pub use hourly::{HourlyKey, HourlyRecord, HourlyRecordBuilder, Season, Slot, TemporalFeatures};
pub use live::LiveReading;
pub use observation::{Observation, Parameter, Pollutant, Source, WeatherField};
