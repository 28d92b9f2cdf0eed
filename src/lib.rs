//! # spheredb - similarity search over metric spaces
//!
//! spheredb is an embedded similarity-search index for high-dimensional
//! key/value data. Given a user-supplied distance function satisfying the
//! metric axioms (non-negativity, symmetry, triangle inequality), it stores
//! (key, value) tuples on a pluggable byte-oriented storage backend and
//! answers two query shapes:
//!
//! - **range search** - all tuples within a fixed distance of a probe key
//! - **kNN search** - the k tuples nearest to a probe key
//!
//! ## How it works
//!
//! On storage, the index is a ball-tree of metric spheres: every node owns a
//! (center, radius) pair, inner nodes route to child spheres, and leaves own
//! pages of tuples. Writes arrive in batches; each batch is compiled into a
//! single atomic transaction that descends the tree, grows radii, splits
//! overflowing nodes, and incrementally repacks old leaves so spheres stay
//! tight without stop-the-world passes. Queries descend with an explicit
//! stack and use the sphere geometry to prune whole subtrees, so only the
//! leaf pages that can actually contain results are ever loaded.
//!
//! Writers are serialized optimistically: every transaction remembers which
//! tree state it was built from, and the storage layer rejects it if the
//! tree has moved on.
//!
//! ## Quick start
//!
//! ```rust
//! use spheredb::batch::Batch;
//! use spheredb::codec::{StringCodec, VectorCodec};
//! use spheredb::config::TreeConfig;
//! use spheredb::tuple::Tuple;
//!
//! # fn main() -> spheredb::errors::SphereResult<()> {
//! fn euclidean(a: &Vec<f64>, b: &Vec<f64>) -> f64 {
//!     a.iter()
//!         .zip(b.iter())
//!         .map(|(x, y)| (x - y) * (x - y))
//!         .sum::<f64>()
//!         .sqrt()
//! }
//!
//! let tree = TreeConfig::builder()
//!     .metric(euclidean)
//!     .key_codec(VectorCodec)
//!     .value_codec(StringCodec)
//!     .build_tree()?;
//!
//! let tuples = vec![
//!     Tuple::new(vec![0.0, 0.0], "origin".to_string()),
//!     Tuple::new(vec![3.0, 4.0], "corner".to_string()),
//! ];
//! tree.add_batch(Batch::new(tuples))?;
//!
//! let nearest = tree.knn_search(vec![0.1, 0.1], 1)?;
//! assert_eq!(nearest.result(0).unwrap().value(), Some(&"origin".to_string()));
//! # Ok(())
//! # }
//! ```
//!
//! ## Module organization
//!
//! - [`batch`] - batches of tuples and the batch accumulator
//! - [`codec`] - converting user key/value types to and from bytes
//! - [`config`] - the tree configuration and its builder
//! - [`errors`] - error types and the crate-wide result alias
//! - [`id`] - 128-bit sortable time-seeded identifiers
//! - [`metric`] - the distance-metric contract and its instrumentation
//! - [`node`] - node headers (the cacheable routing structure)
//! - [`page`] - leaf data pages (the I/O unit)
//! - [`store`] - the byte-storage contract and the in-memory backend
//! - [`transaction`] - atomic changesets
//! - [`tree`] - the engine and the public [`tree::MetricTree`] façade
//! - [`tuple`] - the key/value unit of data

pub mod batch;
pub mod codec;
pub mod config;
pub mod errors;
pub mod id;
pub mod metric;
pub mod node;
pub mod page;
pub mod store;
pub mod transaction;
pub mod tree;
pub mod tuple;

pub use crate::config::TreeConfig;
pub use crate::errors::{ErrorKind, SphereError, SphereResult};
pub use crate::tree::MetricTree;
