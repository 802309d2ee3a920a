//! # Crawler Module
//!
//! Builds a [`PageGraph`] by recursively resolving linked pages from a seed.
//!
//! ## Overview
//!
//! The crawl is split between one coordinator and a bounded pool of workers,
//! connected by channels. Workers do the slow part: resolving a child address
//! into a page, or enumerating the outbound links of an already-resolved
//! page. The coordinator is the only writer to the graph; it receives worker
//! outcomes, performs the idempotent node/edge insertions, and decides which
//! nodes to expand.
//!
//! ## Expansion Rules
//!
//! A resolved child is always inserted (node and parent edge). It is expanded
//! only when it is new to the graph and its depth is below the bound: a node
//! reached again through another parent contributes an edge but is never
//! expanded twice, which is also what breaks link cycles. Children that fail
//! to resolve are logged and skipped without disturbing their siblings.
//!
//! ## Cancellation
//!
//! A [`CancelHandle`] is observable at every scheduling boundary and by every
//! worker between jobs. Cancellation is not an error: the crawl stops
//! scheduling, abandons in-flight work, and returns the graph accumulated so
//! far. Nodes are only ever inserted fully resolved, so a partial graph is
//! still a consistent one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashSet;
use kanal::{AsyncReceiver, AsyncSender};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::error::WikiError;
use crate::graph::{GraphNode, PageGraph};
use crate::page::{Page, PageTarget};
use crate::wiki::WikiInner;

/// Cooperative cancellation signal for crawl operations.
///
/// Cloning shares the underlying flag. Once cancelled, a handle stays
/// cancelled; crawls observing it return their partial graph.
#[derive(Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of every crawl observing this handle.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves when cancellation has been requested.
    pub(crate) async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

enum Job {
    /// Resolve a discovered link into a page.
    Resolve {
        address: String,
        parent: String,
        depth: usize,
    },
    /// Enumerate the children of an already-resolved page.
    Expand {
        address: String,
        page: Arc<Page>,
        depth: usize,
    },
}

enum Outcome {
    Resolved {
        parent: String,
        depth: usize,
        link_address: String,
        result: Result<Arc<Page>, WikiError>,
    },
    Expanded {
        address: String,
        depth: usize,
        result: Result<Vec<String>, WikiError>,
    },
}

pub(crate) struct Crawler {
    inner: Arc<WikiInner>,
    max_depth: usize,
    concurrency: usize,
}

impl Crawler {
    pub(crate) fn new(inner: Arc<WikiInner>, max_depth: usize, concurrency: usize) -> Self {
        Crawler {
            inner,
            max_depth,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs the crawl from an already-resolved seed.
    pub(crate) async fn run(&self, seed: Arc<Page>) -> Result<PageGraph, WikiError> {
        let graph = PageGraph::new();
        let visited: DashSet<String> = DashSet::new();
        let cancel = self.inner.cancel.clone();
        let stats = self.inner.stats.clone();

        let seed_address = seed.address().await?;
        let seed_title = seed.title().await?;
        graph.insert_node(GraphNode {
            address: seed_address.clone(),
            title: seed_title,
            page: seed.clone(),
        });
        stats.increment_nodes_inserted();

        info!(
            seed = %seed_address,
            max_depth = self.max_depth,
            concurrency = self.concurrency,
            "starting crawl"
        );

        let (job_tx, job_rx) = kanal::unbounded_async::<Job>();
        let (outcome_tx, outcome_rx) = kanal::bounded_async::<Outcome>(self.concurrency * 2);

        let mut workers = JoinSet::new();
        for _ in 0..self.concurrency {
            workers.spawn(run_worker(
                self.inner.clone(),
                job_rx.clone(),
                outcome_tx.clone(),
                cancel.clone(),
            ));
        }
        drop(outcome_tx);
        drop(job_rx);

        let mut pending = 0usize;

        if self.max_depth > 0 && !cancel.is_cancelled() {
            visited.insert(seed_address.clone());
            if job_tx
                .send(Job::Expand {
                    address: seed_address.clone(),
                    page: seed.clone(),
                    depth: 0,
                })
                .await
                .is_ok()
            {
                pending += 1;
            }
        }

        while pending > 0 {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("crawl cancelled; returning the partial graph");
                    break;
                }
                received = outcome_rx.recv() => match received {
                    Ok(outcome) => outcome,
                    Err(_) => break,
                },
            };
            pending -= 1;

            match outcome {
                Outcome::Expanded {
                    address,
                    depth,
                    result,
                } => match result {
                    Ok(children) => {
                        trace!(parent = %address, children = children.len(), "expanding node");
                        for child in children {
                            if cancel.is_cancelled() {
                                break;
                            }
                            // A link that already resolved to a node needs an
                            // edge at most; it is never expanded again.
                            if graph.contains(&child) {
                                if graph.insert_edge(&address, &child) {
                                    stats.increment_edges_inserted();
                                }
                                continue;
                            }
                            if job_tx
                                .send(Job::Resolve {
                                    address: child,
                                    parent: address.clone(),
                                    depth: depth + 1,
                                })
                                .await
                                .is_ok()
                            {
                                pending += 1;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(node = %address, error = %e, "child enumeration failed; node stays a leaf");
                    }
                },
                Outcome::Resolved {
                    parent,
                    depth,
                    link_address,
                    result,
                } => match result {
                    Ok(page) => {
                        let (canonical, title) = match (page.address().await, page.title().await) {
                            (Ok(address), Ok(title)) => (address, title),
                            _ => {
                                stats.increment_children_skipped();
                                warn!(link = %link_address, "resolved page lost its metadata; skipping");
                                continue;
                            }
                        };
                        let newly = graph.insert_node(GraphNode {
                            address: canonical.clone(),
                            title,
                            page: page.clone(),
                        });
                        if newly {
                            stats.increment_nodes_inserted();
                        }
                        if graph.insert_edge(&parent, &canonical) {
                            stats.increment_edges_inserted();
                        }
                        if newly && depth < self.max_depth && visited.insert(canonical.clone()) {
                            if job_tx
                                .send(Job::Expand {
                                    address: canonical,
                                    page,
                                    depth,
                                })
                                .await
                                .is_ok()
                            {
                                pending += 1;
                            }
                        }
                        debug!(
                            nodes = graph.len(),
                            edges = graph.edge_count(),
                            pending,
                            "crawl progress"
                        );
                    }
                    Err(e) => {
                        stats.increment_children_skipped();
                        warn!(
                            link = %link_address,
                            parent = %parent,
                            error = %e,
                            "child failed to resolve; skipping"
                        );
                    }
                },
            }
        }

        drop(job_tx);
        if cancel.is_cancelled() {
            workers.abort_all();
        }
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!(error = %e, "crawl worker failed");
                }
            }
        }

        info!(
            nodes = graph.len(),
            edges = graph.edge_count(),
            "crawl finished"
        );
        Ok(graph)
    }
}

async fn run_worker(
    inner: Arc<WikiInner>,
    jobs: AsyncReceiver<Job>,
    outcomes: AsyncSender<Outcome>,
    cancel: CancelHandle,
) {
    while let Ok(job) = jobs.recv().await {
        if cancel.is_cancelled() {
            break;
        }
        let outcome = match job {
            Job::Resolve {
                address,
                parent,
                depth,
            } => {
                let result = resolve_child(&inner, &address).await;
                Outcome::Resolved {
                    parent,
                    depth,
                    link_address: address,
                    result,
                }
            }
            Job::Expand {
                address,
                page,
                depth,
            } => {
                let result = page.child_addresses().await;
                Outcome::Expanded {
                    address,
                    depth,
                    result,
                }
            }
        };
        if outcomes.send(outcome).await.is_err() {
            break;
        }
    }
}

async fn resolve_child(inner: &Arc<WikiInner>, address: &str) -> Result<Arc<Page>, WikiError> {
    let page = Page::new(inner, PageTarget::Address(address.to_string()), None)?;
    // Force the metadata lookup so only fully resolved pages enter the graph.
    page.resolution().await?;
    Ok(Arc::new(page))
}
