//! Launchpad Auth
//!
//! Identity phase of a deployment:
//! - Device-code flow for deploying into the user's own account
//! - Authorization-code flow for the managed tenant environment
//! - [`AuthRouter`] owning per-session state behind a [`SessionStore`]

pub mod driver;
pub mod error;
pub mod router;
pub mod state;
pub mod store;

pub use driver::{
    AuthChallenge, AuthCodeDriver, AuthEvidence, AuthOutcome, AuthResult, CodeExchange,
    DeviceAuthorizationApi, DeviceCodeDriver, HostedLoginClient, IdentityDriver, IssuedChallenge,
    OidcDeviceClient,
};
pub use error::{DeviceFlowError, DriverFailure, ExchangeError};
pub use router::{AuthRouter, BeginAuthResponse, FlowOption, OptionsMenu};
pub use state::{allowed_transitions, validate_transition};
pub use store::{DashMapSessionStore, ExpiringSessionStore, SessionStore};
