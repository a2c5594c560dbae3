//! Key encoding for document ids.
//!
//! Keys are encoded so that byte order equals id order: integers are a type
//! byte followed by the big-endian value, strings a different type byte
//! followed by their UTF-8 bytes. A full scan of a collection therefore
//! yields documents ordered by id.

use crate::document::DocId;

const INT_TAG: u8 = 0x01;
const STR_TAG: u8 = 0x02;

/// Encode a document id as a storage key.
#[must_use]
pub fn encode_id(id: &DocId) -> Vec<u8> {
    match id {
        DocId::Int(n) => {
            let mut key = Vec::with_capacity(9);
            key.push(INT_TAG);
            key.extend_from_slice(&n.to_be_bytes());
            key
        }
        DocId::Str(s) => {
            let mut key = Vec::with_capacity(1 + s.len());
            key.push(STR_TAG);
            key.extend_from_slice(s.as_bytes());
            key
        }
    }
}

/// Decode a storage key back into a document id.
#[must_use]
pub fn decode_id(key: &[u8]) -> Option<DocId> {
    let (tag, rest) = key.split_first()?;
    match *tag {
        INT_TAG => {
            let bytes: [u8; 8] = rest.try_into().ok()?;
            Some(DocId::Int(u64::from_be_bytes(bytes)))
        }
        STR_TAG => std::str::from_utf8(rest)
            .ok()
            .map(|s| DocId::Str(s.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_keys_sort_numerically() {
        let mut keys: Vec<_> = [10u64, 2, 255, 256, 0]
            .iter()
            .map(|n| encode_id(&DocId::Int(*n)))
            .collect();
        keys.sort();
        let decoded: Vec<_> = keys.iter().filter_map(|k| decode_id(k)).collect();
        assert_eq!(
            decoded,
            vec![
                DocId::Int(0),
                DocId::Int(2),
                DocId::Int(10),
                DocId::Int(255),
                DocId::Int(256)
            ]
        );
    }

    #[test]
    fn string_keys_sort_by_name() {
        let mut keys = vec![
            encode_id(&DocId::from("wordpress")),
            encode_id(&DocId::from("mysql")),
        ];
        keys.sort();
        assert_eq!(decode_id(&keys[0]), Some(DocId::from("mysql")));
    }

    #[test]
    fn decode_rejects_unknown_tag() {
        assert_eq!(decode_id(&[0x7f, 1, 2]), None);
        assert_eq!(decode_id(&[]), None);
        assert_eq!(decode_id(&[INT_TAG, 1]), None);
    }
}
