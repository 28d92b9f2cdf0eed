//! Byte-level persistence: the [`DataStore`] contract and the reference
//! in-memory backend.

use crate::errors::SphereResult;
use crate::id::SphereId;
use crate::node::NodeHeader;
use crate::page::DataPage;
use crate::transaction::TreeTransaction;
use crate::tuple::Tuple;

mod memory;

pub use memory::InMemoryStore;

/// A node header whose center key is an opaque byte sequence.
pub type RawNodeHeader = NodeHeader<Vec<u8>>;
/// A data page whose keys and values are opaque byte sequences.
pub type RawDataPage = DataPage<Vec<u8>, Vec<u8>>;
/// A tuple whose key and value are opaque byte sequences.
pub type RawTuple = Tuple<Vec<u8>, Vec<u8>>;
/// A transaction whose keys and values are opaque byte sequences.
pub type RawTransaction = TreeTransaction<Vec<u8>, Vec<u8>>;

/// A DataStore is a strategy object for any I/O system that can read and
/// write node headers and data pages. One implementation keeps everything in
/// process memory; another might sit on an embedded database file.
///
/// The tree treats a DataStore as a dumb byte storage layer: keys and values
/// cross this boundary as opaque byte sequences, converted by the configured
/// codecs on every read and write.
///
/// # Transaction semantics
///
/// [`DataStore::apply_transaction`] is the only mutation. Implementations
/// should apply the whole changeset as one ACID unit; at minimum they MUST
/// guarantee that no query observes a partial state, and they MUST reject a
/// transaction whose `expected_tree_id` does not match the store's current
/// [`DataStore::last_transaction_id`] with a concurrent-modification error.
pub trait DataStore: Send + Sync {
    /// The id of the last transaction that altered this tree, or `None` when
    /// the store is empty. This is the optimistic-concurrency token: it tells
    /// us which snapshot a pending transaction was built from.
    fn last_transaction_id(&self) -> Option<SphereId>;

    /// The id of the root node, or `None` when the store is empty.
    fn root_id(&self) -> Option<SphereId>;

    /// Basic information about the node with this id.
    fn node_at(&self, id: SphereId) -> SphereResult<Option<RawNodeHeader>>;

    /// All the tuples stored at a specific leaf. Analogous to fetching one
    /// page or block from the B-tree backing a traditional database. `None`
    /// is returned for an id with no tuples.
    fn data_page_at(&self, id: SphereId) -> SphereResult<Option<RawDataPage>>;

    /// Applies a changeset, in this order: record the transaction id, delete
    /// pages, delete node headers, write created tuples, write updated
    /// tuples, write created headers, write updated headers, update the root
    /// if a new root is present.
    fn apply_transaction(&self, transaction: RawTransaction) -> SphereResult<()>;
}
