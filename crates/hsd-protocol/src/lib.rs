pub mod announcement;
pub mod service;
pub mod topics;

pub use announcement::*;
pub use service::*;
