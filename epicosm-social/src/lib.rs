//! Social network clients used by the Epicosm harvester.
//!
//! Only the Twitter/X v2 API is implemented: envelope types, the endpoint wrapper,
//! and the continuation-token pagination driver built on `epicosm-http`.
pub mod twitter;
