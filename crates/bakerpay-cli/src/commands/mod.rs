pub mod common;
pub mod continual;
pub mod pay;
pub mod transfer;
