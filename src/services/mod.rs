pub mod auth_service;
pub mod identity;

pub use identity::IdentityDirectory;
