pub mod consolidate;
pub mod goals;
pub mod knowledge;
pub mod scheduler;
pub mod scorer;
pub mod traits;
pub mod turns;
pub mod types;
