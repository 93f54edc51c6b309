pub mod cycle;
pub mod market;
pub mod order;
pub mod position;
pub mod signal;
