pub mod coerce;
pub mod config;
pub mod error;
pub mod value;

pub use coerce::*;
pub use config::*;
pub use error::*;
pub use value::*;
