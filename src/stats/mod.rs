pub mod calculator;
pub mod lifetime;

pub use lifetime::LifetimeStats;
