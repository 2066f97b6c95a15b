//! Query description, the `filter` DSL and the engine that combines them per resource.

pub mod dsl;
mod engine;
mod spec;

pub use dsl::{parse_order, FieldCondition, FieldFilters, FilterSpec};
pub use engine::{FilterQueryEngine, ReadParams, PAGE_SIZE};
pub use spec::{Operator, Predicate, QuerySpec, RelationLoad};
