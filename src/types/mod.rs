pub mod instrument;
pub mod series;
pub mod forecast;

pub use instrument::*;
pub use series::*;
pub use forecast::*;
