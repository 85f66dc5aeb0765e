pub mod config;
pub mod drive;
pub mod email;
pub mod oauth;
pub mod shared;
pub mod store;
