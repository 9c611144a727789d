// tieline-api: Async client for the Tieline device's digest-authenticated control API

pub mod auth;
pub mod digest;
pub mod error;
pub mod session;
pub mod transport;
pub mod wire;

pub use auth::{AuthSession, Credentials, DEFAULT_PORT, SessionState};
pub use digest::DigestCredential;
pub use error::Error;
pub use session::{CommandRequest, SessionEpoch, SessionManager, SignedResponse};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport, TransportConfig};
