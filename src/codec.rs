//! Codecs: converting user key/value types to and from raw byte sequences.
//!
//! The tree engine is generic over keys and values, but every [`crate::store::DataStore`]
//! only ever sees bytes. The configured [`CodecPair`] is applied at the tree
//! boundary on every read and write.

use crate::errors::{ErrorKind, SphereError, SphereResult};
use crate::node::{NodeHeader, NodeKind};
use crate::page::DataPage;
use crate::store::{RawDataPage, RawNodeHeader, RawTransaction, RawTuple};
use crate::transaction::{TreeTransaction, TupleAssignment};
use crate::tuple::Tuple;
use std::sync::Arc;

/// A serializer/deserializer for one specific type.
///
/// Implementations must round-trip: `from_bytes(to_bytes(x)) == x` for every
/// `x` in the domain the codec documents.
pub trait Codec<T>: Send + Sync {
    fn to_bytes(&self, item: &T) -> SphereResult<Vec<u8>>;

    fn from_bytes(&self, bytes: &[u8]) -> SphereResult<T>;
}

/// A codec for UTF-8 strings.
pub struct StringCodec;

impl Codec<String> for StringCodec {
    fn to_bytes(&self, item: &String) -> SphereResult<Vec<u8>> {
        Ok(item.as_bytes().to_vec())
    }

    fn from_bytes(&self, bytes: &[u8]) -> SphereResult<String> {
        Ok(String::from_utf8(bytes.to_vec())?)
    }
}

/// The identity codec for raw byte payloads.
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    fn to_bytes(&self, item: &Vec<u8>) -> SphereResult<Vec<u8>> {
        Ok(item.clone())
    }

    fn from_bytes(&self, bytes: &[u8]) -> SphereResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// A codec for `Vec<f64>` keys (embedding-style vectors), big-endian, 8 bytes
/// per component.
pub struct VectorCodec;

impl Codec<Vec<f64>> for VectorCodec {
    fn to_bytes(&self, item: &Vec<f64>) -> SphereResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(item.len() * 8);
        for component in item {
            bytes.extend_from_slice(&component.to_be_bytes());
        }
        Ok(bytes)
    }

    fn from_bytes(&self, bytes: &[u8]) -> SphereResult<Vec<f64>> {
        if bytes.len() % 8 != 0 {
            return Err(SphereError::new(
                "A vector encoding must be a multiple of 8 bytes",
                ErrorKind::Backend,
            ));
        }
        Ok(bytes
            .chunks_exact(8)
            .map(|chunk| {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                f64::from_be_bytes(buf)
            })
            .collect())
    }
}

/// The key codec and the value codec in one place: the natural home for all
/// aggregate conversions (tuples, headers, pages, whole transactions).
pub struct CodecPair<K, V> {
    key_codec: Arc<dyn Codec<K>>,
    value_codec: Arc<dyn Codec<V>>,
}

impl<K, V> Clone for CodecPair<K, V> {
    fn clone(&self) -> Self {
        CodecPair {
            key_codec: self.key_codec.clone(),
            value_codec: self.value_codec.clone(),
        }
    }
}

impl<K, V> CodecPair<K, V> {
    pub fn new(key_codec: Arc<dyn Codec<K>>, value_codec: Arc<dyn Codec<V>>) -> Self {
        CodecPair {
            key_codec,
            value_codec,
        }
    }

    pub fn encode_key(&self, key: &K) -> SphereResult<Vec<u8>> {
        self.key_codec.to_bytes(key)
    }

    pub fn decode_key(&self, bytes: &[u8]) -> SphereResult<K> {
        self.key_codec.from_bytes(bytes)
    }

    pub fn encode_tuple(&self, tuple: &Tuple<K, V>) -> SphereResult<RawTuple> {
        let key = self.key_codec.to_bytes(tuple.key())?;
        let value = match tuple.value() {
            Some(value) => Some(self.value_codec.to_bytes(value)?),
            None => None,
        };
        Ok(Tuple::restore(tuple.id(), key, value))
    }

    pub fn decode_tuple(&self, raw: &RawTuple) -> SphereResult<Tuple<K, V>> {
        let key = self.key_codec.from_bytes(raw.key())?;
        let value = match raw.value() {
            Some(bytes) => Some(self.value_codec.from_bytes(bytes)?),
            None => None,
        };
        Ok(Tuple::restore(raw.id(), key, value))
    }

    pub fn encode_header(&self, header: &NodeHeader<K>) -> SphereResult<RawNodeHeader> {
        let center = self.key_codec.to_bytes(header.center())?;
        Ok(match header.kind() {
            NodeKind::Inner { children } => NodeHeader::inner(
                header.id(),
                header.parent(),
                center,
                header.radius(),
                children.clone(),
            ),
            NodeKind::Leaf { tuple_count } => NodeHeader::leaf(
                header.id(),
                header.parent(),
                center,
                header.radius(),
                *tuple_count,
            ),
        })
    }

    pub fn decode_header(&self, raw: &RawNodeHeader) -> SphereResult<NodeHeader<K>> {
        let center = self.key_codec.from_bytes(raw.center())?;
        Ok(match raw.kind() {
            NodeKind::Inner { children } => NodeHeader::inner(
                raw.id(),
                raw.parent(),
                center,
                raw.radius(),
                children.clone(),
            ),
            NodeKind::Leaf { tuple_count } => NodeHeader::leaf(
                raw.id(),
                raw.parent(),
                center,
                raw.radius(),
                *tuple_count,
            ),
        })
    }

    pub fn decode_page(&self, raw: &RawDataPage) -> SphereResult<DataPage<K, V>> {
        let mut page = DataPage::new(raw.id());
        for raw_tuple in raw.tuples() {
            page.insert(self.decode_tuple(raw_tuple)?);
        }
        Ok(page)
    }

    pub fn encode_assignment(
        &self,
        assignment: &TupleAssignment<K, V>,
    ) -> SphereResult<TupleAssignment<Vec<u8>, Vec<u8>>> {
        Ok(TupleAssignment::assign(
            self.encode_tuple(assignment.tuple())?,
            assignment.page_id(),
        ))
    }

    /// Encodes a whole transaction for the storage layer. The transaction id
    /// is preserved so the store records the same id the engine handed out.
    pub fn encode_transaction(&self, tx: &TreeTransaction<K, V>) -> SphereResult<RawTransaction> {
        let encode_headers = |headers: &[NodeHeader<K>]| -> SphereResult<Vec<RawNodeHeader>> {
            headers.iter().map(|h| self.encode_header(h)).collect()
        };
        let encode_assignments = |assignments: &[TupleAssignment<K, V>]| -> SphereResult<
            Vec<TupleAssignment<Vec<u8>, Vec<u8>>>,
        > {
            assignments
                .iter()
                .map(|a| self.encode_assignment(a))
                .collect()
        };

        TreeTransaction::with_id(
            tx.transaction_id(),
            tx.expected_tree_id(),
            encode_headers(tx.created_nodes())?,
            encode_headers(tx.updated_nodes())?,
            encode_assignments(tx.created_tuples())?,
            encode_assignments(tx.updated_tuples())?,
            tx.deleted_pages().clone(),
            tx.deleted_node_headers().clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::SphereId;

    fn pair() -> CodecPair<Vec<f64>, String> {
        CodecPair::new(Arc::new(VectorCodec), Arc::new(StringCodec))
    }

    #[test]
    fn string_codec_round_trips() {
        let codec = StringCodec;
        let original = "hello, metric space".to_string();
        let bytes = codec.to_bytes(&original).unwrap();
        assert_eq!(codec.from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn string_codec_rejects_invalid_utf8() {
        let codec = StringCodec;
        let err = codec.from_bytes(&[0xFF, 0xFE]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Backend);
    }

    #[test]
    fn bytes_codec_is_identity() {
        let codec = BytesCodec;
        let original = vec![0u8, 1, 2, 255];
        let bytes = codec.to_bytes(&original).unwrap();
        assert_eq!(codec.from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn vector_codec_round_trips() {
        let codec = VectorCodec;
        let original = vec![1.5, -2.25, 0.0, f64::MAX];
        let bytes = codec.to_bytes(&original).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(codec.from_bytes(&bytes).unwrap(), original);
    }

    #[test]
    fn vector_codec_rejects_ragged_input() {
        let codec = VectorCodec;
        let err = codec.from_bytes(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Backend);
    }

    #[test]
    fn tuple_round_trips_through_the_pair() {
        let pair = pair();
        let tuple = Tuple::new(vec![1.0, 2.0], "value".to_string());

        let raw = pair.encode_tuple(&tuple).unwrap();
        let decoded = pair.decode_tuple(&raw).unwrap();

        assert_eq!(decoded.id(), tuple.id());
        assert_eq!(decoded.key(), tuple.key());
        assert_eq!(decoded.value(), tuple.value());
    }

    #[test]
    fn value_less_tuple_stays_value_less() {
        let pair = pair();
        let tuple: Tuple<Vec<f64>, String> = Tuple::key_only(vec![1.0]);

        let raw = pair.encode_tuple(&tuple).unwrap();
        assert!(raw.value().is_none());

        let decoded = pair.decode_tuple(&raw).unwrap();
        assert!(decoded.value().is_none());
    }

    #[test]
    fn headers_round_trip_both_kinds() {
        let pair = pair();
        let child = SphereId::new();

        let inner = NodeHeader::inner(SphereId::new(), None, vec![0.5], 2.0, vec![child]);
        let raw_inner = pair.encode_header(&inner).unwrap();
        let decoded_inner = pair.decode_header(&raw_inner).unwrap();
        assert!(decoded_inner.is_inner());
        assert_eq!(decoded_inner.children().unwrap(), &[child]);
        assert_eq!(decoded_inner.center(), inner.center());

        let leaf = NodeHeader::leaf(SphereId::new(), Some(SphereId::new()), vec![0.5], 2.0, 9);
        let raw_leaf = pair.encode_header(&leaf).unwrap();
        let decoded_leaf = pair.decode_header(&raw_leaf).unwrap();
        assert!(decoded_leaf.is_leaf());
        assert_eq!(decoded_leaf.tuple_count().unwrap(), 9);
    }

    #[test]
    fn encoding_a_transaction_preserves_its_id() {
        let pair = pair();
        let leaf_id = SphereId::new();
        let root = NodeHeader::inner(SphereId::new(), None, vec![0.0], 1.0, vec![leaf_id]);
        let leaf = NodeHeader::leaf(leaf_id, Some(root.id()), vec![0.0], 1.0, 0);

        let tx = TreeTransaction::<Vec<f64>, String>::new(
            None,
            vec![root, leaf],
            vec![],
            vec![],
            vec![],
            Default::default(),
            Default::default(),
        )
        .unwrap();

        let raw = pair.encode_transaction(&tx).unwrap();
        assert_eq!(raw.transaction_id(), tx.transaction_id());
        assert_eq!(raw.new_root(), tx.new_root());
        assert_eq!(raw.created_nodes().len(), 2);
    }
}
