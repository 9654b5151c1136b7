pub mod app_error;
pub mod messages;
pub mod ports;
pub mod use_cases;
