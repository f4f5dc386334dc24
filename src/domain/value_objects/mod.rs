pub mod route_class;
pub mod severity;

pub use route_class::*;
pub use severity::*;
