pub mod auth;
pub mod certificates;
