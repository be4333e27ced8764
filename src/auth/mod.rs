//! Authentication decision layer.
//!
//! Three flags (`session`, `jwt`, `strict`) pick one of four guards. Resource
//! guards only read: they resolve the identity from the session cookie and/or
//! the access token. The login guard validates credentials through
//! [`policy::LoginPolicy`] and then writes a session and/or mints a token.
//!
//! ## Token revocation
//!
//! Access tokens are stateless, so sign-out and renewal put the presented
//! token on a [`token::TokenDenylist`] until its `exp`. The list is held in
//! process memory.

pub mod config;
pub mod error;
pub mod guard;
pub mod identity;
pub mod password;
pub mod policy;
pub mod session;
pub mod state;
pub mod token;

pub use config::{AuthConfig, AuthFlags};
pub use error::{AuthError, ConfigError};
pub use guard::{AuthResult, GuardVariant, RequestContext, RouteKind, evaluate, select};
pub use identity::{Identity, RoleRef};
pub use policy::{LoginCredentials, LoginOutcome, LoginPolicy};
pub use session::{MemorySessionStore, PgSessionStore, SessionStore};
pub use state::AuthState;
pub use token::{TokenCodec, TokenDenylist, VerifyMode};
