pub mod position_manager;
pub mod risk_manager;
