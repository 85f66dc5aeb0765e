pub mod auth;
pub mod blog;
pub mod core;
pub mod embeds;
pub mod main_module;
pub mod notifications;
pub mod taxonomy;
pub mod uploads;
pub mod workspaces;

pub use main_module::build_router;
