pub mod admin;
pub mod health;
pub mod trending;
pub mod views;
