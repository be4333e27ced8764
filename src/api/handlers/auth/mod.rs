//! Authentication endpoints: sign-in (password or token), sign-out, sign-up,
//! password reset and the current-session views.

pub mod cookies;
pub mod password;
pub mod session;
pub mod sign_in;
pub mod sign_out;
pub mod sign_up;
pub mod types;
