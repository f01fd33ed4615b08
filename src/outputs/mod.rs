//! Output generation for the JSON feed and the calendar subscriptions.
//!
//! # Submodules
//!
//! - [`json`]: the competitions feed consumed by the map front-end
//! - [`ics`]: RFC 5545 calendars, one per club plus a combined one
//! - [`indexes`]: `calendars/index.json`, with stable file names per club
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── competitions.json
//! └── calendars/
//!     ├── index.json
//!     ├── all.ics
//!     ├── ks-tarcza-gniezno.ics
//!     └── lok-leszno.ics
//! ```

pub mod ics;
pub mod indexes;
pub mod json;
