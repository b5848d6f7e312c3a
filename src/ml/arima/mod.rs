pub mod model;
pub mod stationarity;
pub mod stepwise;
pub mod strategy;

pub use model::{z_score, InformationCriterion};
pub use strategy::ClassicalStrategy;
