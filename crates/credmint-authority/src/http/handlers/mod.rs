//! HTTP request handlers.

mod admin;
mod health;
mod role_cert;

pub use admin::{add_user, delete_user, list_users, new_bootstrap_otp};
pub use health::health_check;
pub use role_cert::issue_role_certificate;

#[cfg(test)]
pub(crate) mod test_support;
