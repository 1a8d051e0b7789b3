//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (load current table snapshot)
//!     → table.rs (walk routes in priority order)
//!     → predicate.rs / matcher.rs (evaluate Path patterns)
//!     → Return: matched Route or None
//!
//! Route Compilation (startup and reload):
//!     RouteDefinition[]
//!     → predicate.rs registry (name → parser)
//!     → Sort by order (stable)
//!     → Publish as immutable RouteTable (atomic swap)
//! ```
//!
//! # Design Decisions
//! - Routes compiled once, immutable while published
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by `order`, ascending)

pub mod matcher;
pub mod predicate;
pub mod route;
pub mod router;
pub mod table;

pub use predicate::{Predicate, PredicateError, PredicateRegistry};
pub use route::{Filter, Route, RouteTarget, LOAD_BALANCED_PREFIX};
pub use router::Router;
pub use table::RouteTable;
