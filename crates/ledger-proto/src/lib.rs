//! Protobuf wire messages, the RPC method table and domain conversions.

pub mod convert;
pub mod fields;
pub mod service;
pub mod v1;

pub use service::ServiceMethod;

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use prost::Message;

    use super::v1;

    fn body_with_fields(order: &[(&str, u64)]) -> v1::TransactionBody {
        let mut fields = BTreeMap::new();
        for (name, value) in order {
            fields.insert(
                name.to_string(),
                v1::FieldValue {
                    value: Some(v1::field_value::Value::Uint(*value)),
                },
            );
        }
        v1::TransactionBody {
            transaction_id: None,
            node_account_id: Some(v1::AccountId {
                shard_num: 0,
                realm_num: 0,
                account: Some(v1::account_id::Account::AccountNum(3)),
            }),
            transaction_fee: 200_000_000,
            transaction_valid_duration: Some(v1::Duration { seconds: 120 }),
            memo: "memo".to_string(),
            kind: "cryptoTransfer".to_string(),
            fields,
            chunk_info: None,
        }
    }

    #[test]
    fn body_encoding_ignores_field_insertion_order() {
        let first = body_with_fields(&[("a", 1), ("b", 2), ("c", 3)]);
        let second = body_with_fields(&[("c", 3), ("a", 1), ("b", 2)]);
        assert_eq!(first.encode_to_vec(), second.encode_to_vec());
    }

    #[test]
    fn signed_transaction_round_trip() {
        let body = body_with_fields(&[("amount", 10)]);
        let signed = v1::SignedTransaction {
            body_bytes: body.encode_to_vec(),
            sig_map: Some(v1::SignatureMap {
                sig_pair: vec![v1::SignaturePair {
                    pub_key_prefix: vec![7; 32],
                    signature: Some(v1::signature_pair::Signature::Ed25519(vec![1; 64])),
                }],
            }),
        };

        let encoded = signed.encode_to_vec();
        let decoded =
            v1::SignedTransaction::decode(encoded.as_slice()).expect("decode should succeed");
        assert_eq!(decoded, signed);
        let decoded_body =
            v1::TransactionBody::decode(decoded.body_bytes.as_slice()).expect("decode body");
        assert_eq!(decoded_body, body);
    }

    #[test]
    fn method_paths_resolve() {
        let method = crate::service::CONSENSUS_SUBMIT_MESSAGE;
        assert_eq!(method.path(), "/proto.ConsensusService/submitMessage");
        assert_eq!(crate::ServiceMethod::lookup(&method.path()), Some(method));
        assert!(crate::ServiceMethod::lookup("/proto.Nope/nothing").is_none());
    }
}
