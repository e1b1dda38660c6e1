mod auth_service_impl;
mod blacklist_service_impl;
mod jwt_token_issuer;
mod password_hasher;
mod session_service_impl;

pub use auth_service_impl::*;
pub use blacklist_service_impl::*;
pub use jwt_token_issuer::*;
pub use password_hasher::*;
pub use session_service_impl::*;

mod util;
