pub mod cryptobot;
pub mod panel;
pub mod persistence;
pub mod telegram;
