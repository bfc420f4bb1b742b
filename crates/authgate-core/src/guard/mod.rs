//! Navigation guard and a minimal router that runs it.
//!
//! The guard is a pure policy over `(target path, session)`; it owns no
//! state. The router resolves aliases, asks the guard about every
//! transition, and follows redirects.

pub mod policy;
pub mod router;

pub use policy::{normalize_path, GuardPolicy, Navigation, NavigationGuard};
pub use router::{NavigationError, Router};
