//! Tenant edge: shared types
//!
//! Claim sets and their unverified decoder, admission decisions, request
//! context, configuration, and the error taxonomy. This crate has no I/O.

pub mod claims;
pub mod config;
pub mod decision;
pub mod error;
pub mod headers;
pub mod identity;

pub use claims::{ClaimMetadata, ClaimSet, bearer_token, decode_unverified};
pub use config::{EdgeConfig, RouteSets};
pub use decision::{AdmissionDecision, RequestContext, RouteCategory, TenantResolution};
pub use error::{EdgeError, ErrorBody};
pub use headers::{Headers, QueryParams};
pub use identity::{UserRole, VerifiedUser};
