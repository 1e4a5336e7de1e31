/// Authentication module
///
/// Token codec, refresh-session store, credential gate and session-refresh
/// coordinator, plus password hashing.
mod claims;
mod gate;
mod identity;
mod password;
mod refresh;
mod session;
mod token;

pub use claims::{AccessClaims, RefreshClaims};
pub use gate::{authenticate, mint_token_pair, Credentials, TokenPair};
pub use identity::{IdentityResolver, PgIdentityResolver, Principal};
pub use password::{hash_password, verify_password};
pub use refresh::{logout, refresh_session};
pub use session::{
    InMemoryRefreshSessionStore, PgRefreshSessionStore, RefreshSession, RefreshSessionStore,
};
pub use token::{IssuedAccessToken, IssuedRefreshToken, TokenCodec};
