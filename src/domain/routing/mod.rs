//! Request routing domain
//!
//! An ordered, immutable table of path patterns. The first route whose
//! pattern and method set both match wins.

mod pattern;
mod table;

pub use pattern::{PathParams, RoutePattern};
pub use table::{Route, RouteMatch, RouteTable};
