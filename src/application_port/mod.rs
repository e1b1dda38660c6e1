mod auth_service;
mod blacklist_service;
mod session_service;
mod token_issuer;

pub use auth_service::*;
pub use blacklist_service::*;
pub use session_service::*;
pub use token_issuer::*;
