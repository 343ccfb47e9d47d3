//! Transit Map Viewer - Application Library
//!
//! Desktop viewer for Lima's public transit systems: it reads the static
//! datasets from a data directory, hands them to the transit map engine and
//! draws the checked layers on a slippy map.

mod app;
pub mod data;

pub use app::TransitMapViewerApp;
pub use app::settings::Settings;
pub use app::state::TilesProvider;
