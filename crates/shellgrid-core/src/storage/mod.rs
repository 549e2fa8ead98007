//! Persistence of the grid.

mod csv;

use chrono::{DateTime, Utc};
use shellgrid_engine::engine::Grid;

use crate::error::Result;

pub use csv::CsvStore;

/// Where the grid lives between runs.
pub trait GridStore: Send + Sync {
    /// Load the stored grid. A store with nothing in it yields an empty grid.
    fn load(&self) -> Result<Grid>;

    fn save(&self, grid: &Grid) -> Result<()>;

    /// Last modification time, `None` if nothing has been stored yet.
    fn modified(&self) -> Result<Option<DateTime<Utc>>>;
}
