pub mod account;
pub mod app;
pub mod identity;
pub mod message;
