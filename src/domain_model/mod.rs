mod blacklist;
mod session;
mod token;
mod user;

pub use blacklist::*;
pub use session::*;
pub use token::*;
pub use user::*;
