mod adapter;
mod decoder;
mod schema;

pub use adapter::*;
pub use decoder::*;
pub use schema::*;
