pub mod loader;
pub mod profiles;
pub mod settings;

pub use loader::*;
pub use profiles::*;
pub use settings::*;
