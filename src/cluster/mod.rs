#[cfg(test)]
pub(crate) mod fakes;
pub mod helm;
pub mod process;
pub mod traits;

pub use helm::*;
pub use process::*;
pub use traits::*;
