mod error_handler;
mod identity;

pub use error_handler::log_errors;
pub use identity::{
    EMAIL_HEADER, IdentityGateway, MissingClaim, NAME_HEADER, USERNAME_HEADER, identity_gateway,
};
