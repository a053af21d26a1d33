//! Tenant edge: request evaluation.
//!
//! Resolves the tenant from the host, classifies the path, consults the
//! session provider, and turns the outcome into a rewrite, redirect,
//! pass-through, or denial before any application handler runs.

pub mod admission;
pub mod evaluator;
pub mod middleware;
pub mod rewrite;
pub mod routes;
pub mod session;
pub mod tenant;

pub use admission::{AdminCredential, Admitted, AdmissionRejection, BearerCredential, require_admin, require_bearer};
pub use evaluator::{AuthMode, AuthModeHook, EdgeEvaluator, Evaluation};
pub use middleware::{edge_middleware, with_edge};
pub use routes::RouteClassifier;
pub use session::{
    CookieSessionProvider, IdentityProvider, NoSessionProvider, Session, SessionLookup,
    SessionProvider,
};
pub use tenant::resolve_subdomain;
