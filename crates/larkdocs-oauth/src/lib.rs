//! Credentials for calls to the Lark open platform.
//!
//! A [`CredentialManager`] is built once at startup and hands out bearer
//! tokens. It either passes through a static token or runs the OAuth 2.0
//! authorization-code flow against Lark and refreshes the resulting user
//! token before it expires.
//!
//! # Components
//!
//! - [`oauth`] - authorization URL, state generation, token endpoint client
//! - [`credential`] - mode selection and single-flight refresh

pub mod credential;
pub mod error;
pub mod oauth;

pub use credential::{
    AuthorizationRequest, CredentialManager, CredentialMode, CredentialSettings,
    CredentialStatus, DEFAULT_REFRESH_SKEW, MIN_REFRESH_SKEW,
};
pub use error::{OAuthError, Result};
pub use oauth::{
    DEFAULT_API_DOMAIN, DEFAULT_DOMAIN, DEFAULT_PORT, DEFAULT_SCOPE, HttpTokenEndpoint,
    OAuthConfig, OAuthTokens, TokenEndpoint, default_redirect_uri,
};
