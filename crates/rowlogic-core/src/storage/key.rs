//! Row key encoding for the sled store.
//!
//! Key format: `[entity name bytes][0x00][id (8 bytes, big-endian)]`
//!
//! Big-endian ids keep a prefix scan over one entity type in primary key
//! order.
//!
//! Reference index format:
//! `[entity][0x00][attribute][0x00][parent id (8 bytes, BE)][child id (8 bytes, BE)]`

use super::RowKey;

/// Separator between entity name and id.
const SEPARATOR: u8 = 0x00;

/// Size of the encoded id in bytes.
const ID_SIZE: usize = 8;

/// Encode a row key to bytes.
pub fn encode(key: &RowKey) -> Vec<u8> {
    let mut buf = entity_prefix(&key.entity);
    buf.extend_from_slice(&key.id.to_be_bytes());
    buf
}

/// Prefix shared by every key of an entity type.
pub fn entity_prefix(entity: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entity.len() + 1 + ID_SIZE);
    buf.extend_from_slice(entity.as_bytes());
    buf.push(SEPARATOR);
    buf
}

/// Prefix shared by the index entries of one parent's children.
pub fn reference_prefix(entity: &str, attribute: &str, parent_id: u64) -> Vec<u8> {
    let mut buf = entity_prefix(entity);
    buf.reserve(attribute.len() + 1 + 2 * ID_SIZE);
    buf.extend_from_slice(attribute.as_bytes());
    buf.push(SEPARATOR);
    buf.extend_from_slice(&parent_id.to_be_bytes());
    buf
}

/// Index entry for a child row holding `parent_id` in `attribute`.
pub fn reference_key(entity: &str, attribute: &str, parent_id: u64, id: u64) -> Vec<u8> {
    let mut buf = reference_prefix(entity, attribute, parent_id);
    buf.extend_from_slice(&id.to_be_bytes());
    buf
}

/// Child id of a reference index entry.
pub fn reference_child(bytes: &[u8]) -> Option<u64> {
    let start = bytes.len().checked_sub(ID_SIZE)?;
    let mut id = [0u8; ID_SIZE];
    id.copy_from_slice(&bytes[start..]);
    Some(u64::from_be_bytes(id))
}

/// Decode a row key from bytes.
pub fn decode(bytes: &[u8]) -> Option<RowKey> {
    if bytes.len() < ID_SIZE + 1 {
        return None;
    }
    let (head, id_bytes) = bytes.split_at(bytes.len() - ID_SIZE);
    let (entity, separator) = head.split_at(head.len() - 1);
    if separator != [SEPARATOR] {
        return None;
    }
    let entity = std::str::from_utf8(entity).ok()?;
    let mut id = [0u8; ID_SIZE];
    id.copy_from_slice(id_bytes);
    Some(RowKey::new(entity, u64::from_be_bytes(id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip() {
        let key = RowKey::new("Order", 42);
        assert_eq!(decode(&encode(&key)), Some(key));
    }

    #[test]
    fn test_prefix_isolates_entities() {
        let item = encode(&RowKey::new("Item", 1));
        assert!(item.starts_with(&entity_prefix("Item")));
        assert!(!item.starts_with(&entity_prefix("It")));
    }

    #[test]
    fn test_ordering_follows_id() {
        let a = encode(&RowKey::new("Item", 2));
        let b = encode(&RowKey::new("Item", 256));
        assert!(a < b);
    }

    #[test]
    fn test_reference_key_under_parent_prefix() {
        let key = reference_key("Item", "order_id", 7, 300);
        assert!(key.starts_with(&reference_prefix("Item", "order_id", 7)));
        assert!(!key.starts_with(&reference_prefix("Item", "order_id", 8)));
        assert!(!key.starts_with(&reference_prefix("Item", "product_id", 7)));
        assert_eq!(reference_child(&key), Some(300));
        assert_eq!(reference_child(b"short"), None);
    }

    #[test]
    fn test_decode_rejects_short_or_malformed() {
        assert_eq!(decode(b"abc"), None);
        let mut bad = encode(&RowKey::new("Item", 1));
        let sep = bad.len() - ID_SIZE - 1;
        bad[sep] = b'x';
        assert_eq!(decode(&bad), None);
    }
}
