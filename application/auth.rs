mod gate;
mod middleware;
mod oracle;
mod token;

pub use gate::{
    validate_username, AuthGate, AuthMethod, AuthPolicy, AuthRejection, AuthenticatedIdentity,
};
pub use middleware::{api_key_authenticator, password_authenticator, upload_authenticator};
pub use oracle::{AuthOracle, DynAuthOracle, StaticOracle};
pub use token::{generate_api_key, hash, validate_key, API_KEY_LENGTH};
