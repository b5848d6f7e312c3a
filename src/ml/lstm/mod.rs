pub mod network;
pub mod strategy;

pub use strategy::LearnedStrategy;
