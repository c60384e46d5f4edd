#[macro_use]
pub mod macros;

pub mod percentage;
pub mod price;
