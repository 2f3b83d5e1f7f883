pub mod chart_index;
pub mod reconcile;
pub mod registry;

pub use chart_index::*;
pub use reconcile::*;
pub use registry::*;
