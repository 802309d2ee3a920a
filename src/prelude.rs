//! A "prelude" for users of the `wikigraph` crate.
//!
//! This prelude re-exports the most commonly used types and traits so that
//! they can be easily imported.
//!
//! # Example
//!
//! ```
//! use wikigraph::prelude::*;
//! ```

pub use crate::{
    // Core structs
    CancelHandle,
    Page,
    PageGraph,
    PageTarget,
    Wiki,
    WikiBuilder,
    WikiError,
    // Cache and transport seams
    MemoryStore,
    ResponseStore,
    Transport,
    // Essential re-export for trait implementation
    async_trait,
};
