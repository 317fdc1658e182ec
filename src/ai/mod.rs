pub mod error;
pub mod reason_check;
