//! Query execution: cache keys, execution contexts, hook registration and
//! the cached `Queryable` front.

pub mod cache_key;
pub mod context;
pub mod queryable;
pub mod registration;

pub use cache_key::{CacheKeySelector, query_cache_key};
pub use context::{ExecutionContext, execute};
pub use queryable::Queryable;
pub use registration::{
    FromMethod, IntoMethod, Provider, QueryableProvider, TableMethods, install_functions,
    install_provider,
};
