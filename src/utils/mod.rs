pub mod constants;
pub mod coordinates;
pub mod progress;
pub mod text;
pub mod time;

pub use constants::*;
pub use coordinates::{grid_cell_key, BoundingBox};
pub use progress::ProgressReporter;
pub use text::{decode_bytes, normalize_unit, read_text_file};
pub use time::{parse_timestamp_utc, parse_utc_offset, truncate_to_hour};
