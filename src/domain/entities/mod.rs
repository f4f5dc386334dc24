pub mod claims;
pub mod request_context;
pub mod violation;

pub use claims::*;
pub use request_context::*;
pub use violation::*;
