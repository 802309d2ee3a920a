//! # wikigraph
//!
//! Lazy, rate-limited Wikipedia page resolution and link-graph crawling.
//!
//! Provides the main components: [`Wiki`], [`Page`], [`PageGraph`], and the
//! infrastructure underneath them: a dependency-graph computation cache
//! ([`LazyStore`]), a rate-limited request [`Gateway`] with optional response
//! memoization, and a bounded-concurrency crawler with cooperative
//! cancellation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wikigraph::{PageTarget, Wiki};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), wikigraph::WikiError> {
//!     let wiki = Wiki::builder()
//!         .language("en")
//!         .rate_limit_wait(std::time::Duration::from_millis(50))
//!         .build()?;
//!
//!     // Single-page resolution: redirects followed, disambiguation detected.
//!     let page = wiki
//!         .page(PageTarget::Title("Rust (programming language)".into()))
//!         .await?;
//!     println!("{} -> {}", page.title().await?, page.address().await?);
//!
//!     // Link-graph crawl, bounded by depth and a worker pool.
//!     let graph = wiki
//!         .page_graph(PageTarget::Title("Graph theory".into()), Some(1))
//!         .await?;
//!     println!("{} nodes, {} edges", graph.len(), graph.edge_count());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod graph;
pub mod page;
pub mod prelude;
pub mod resolve;
pub mod search;
pub mod stats;
pub mod store;
pub mod wiki;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{MemoryStore, ResponseStore, ValidityCheck};
pub use crawler::CancelHandle;
pub use error::WikiError;
pub use extract::{LinkRef, LinkSet};
pub use gateway::{Gateway, HttpTransport, Transport, WireRequest, WireResponse};
pub use graph::{GraphExport, GraphNode, PageGraph};
pub use page::{ContentBundle, Page, PageTarget};
pub use resolve::{PageMeta, Resolution};
pub use stats::StatCollector;
pub use store::{DynValue, Inputs, LazyStore, StoreMode};
pub use wiki::{Wiki, WikiBuilder};

pub use async_trait::async_trait;
pub use tokio;
