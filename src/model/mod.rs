pub mod deployment;
pub mod status;
pub mod tool;
pub mod user;

pub use deployment::*;
pub use status::*;
pub use tool::*;
pub use user::*;
