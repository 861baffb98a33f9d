use proptest::prelude::*;

use bsv_primitives::chainhash::Hash;
use bsv_script::Script;
use bsv_transaction::{Outpoint, Transaction, TransactionInput, TransactionOutput};

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    let arb_input = (
        prop::array::uniform32(any::<u8>()),
        any::<u32>(),
        prop::collection::vec(any::<u8>(), 1..64),
        any::<u32>(),
    )
        .prop_map(|(txid, vout, script, seq)| {
            let mut input = TransactionInput::new(Outpoint::new(Hash::new(txid), vout));
            input.unlocking_script = Some(Script::from_bytes(&script));
            input.sequence_number = seq;
            input
        });

    let arb_output = (any::<u64>(), prop::collection::vec(any::<u8>(), 0..64))
        .prop_map(|(sats, script)| TransactionOutput::new(sats, Script::from_bytes(&script)));

    (
        any::<u32>(),
        prop::collection::vec(arb_input, 1..4),
        prop::collection::vec(arb_output, 1..4),
        any::<u32>(),
    )
        .prop_map(|(version, inputs, outputs, lock_time)| Transaction {
            version,
            inputs,
            outputs,
            lock_time,
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn serialized_bytes_reparse_identically(tx in arb_transaction()) {
        let bytes = tx.to_bytes();
        let parsed = Transaction::from_bytes(&bytes).unwrap();
        prop_assert_eq!(parsed.to_bytes(), bytes);
        prop_assert_eq!(parsed.tx_id(), tx.tx_id());
    }

    #[test]
    fn outpoint_text_form_parses_back(txid in prop::array::uniform32(any::<u8>()), vout in any::<u32>()) {
        let op = Outpoint::new(Hash::new(txid), vout);
        prop_assert_eq!(op.to_string().parse::<Outpoint>().unwrap(), op);
    }

    #[test]
    fn any_truncation_fails_to_parse(tx in arb_transaction(), cut in 1usize..40) {
        let bytes = tx.to_bytes();
        let cut = cut.min(bytes.len());
        prop_assert!(Transaction::from_bytes(&bytes[..bytes.len() - cut]).is_err());
    }
}
