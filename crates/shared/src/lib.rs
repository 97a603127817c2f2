pub mod domain;
pub mod error;
pub mod protocol;
pub mod result;

pub use result::ResultState;
