mod blacklist_repo_mysql;
mod schema;
mod session_repo_mysql;
mod user_repo_mysql;

pub use blacklist_repo_mysql::*;
pub use schema::*;
pub use session_repo_mysql::*;
pub use user_repo_mysql::*;

mod util;
