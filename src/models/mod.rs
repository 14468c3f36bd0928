pub mod fields;
pub mod reading;

pub use fields::*;
pub use reading::*;
