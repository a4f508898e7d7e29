//! Admission control (C2): API-key gate ahead of the pool, session tokens
//! minted after a passed captcha challenge.
//!
//! Grounded on the teacher's credential-cache module (`credential_cache.rs`,
//! deleted in the trimming pass but captured in DESIGN.md): an `Arc<RwLock<_>>`
//! guarding a small set of live credentials, checked on every request.

pub mod api_key;
pub mod session;

pub use api_key::ApiKeyGate;
pub use session::{SessionClaims, SessionTokens};
