mod handler;
mod model;

pub use handler::{list_users, me};
pub use model::{CurrentUser, IdentityClaims, NewUser, Profile, User, UserSummary};
