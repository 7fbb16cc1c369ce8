use bitcoin::{
    Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness,
    absolute::LockTime, hashes::Hash, transaction::Version,
};

/// Creates a version-2 transaction with `num_inputs` null-prevout inputs and `num_outputs`
/// empty zero-value outputs.
pub fn create_dummy_tx(num_inputs: usize, num_outputs: usize) -> Transaction {
    let input = (0..num_inputs)
        .map(|i| TxIn {
            previous_output: OutPoint {
                txid: Txid::from_byte_array([i as u8 + 1; 32]),
                vout: i as u32,
            },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        })
        .collect();
    let output = (0..num_outputs)
        .map(|_| TxOut {
            value: Amount::ZERO,
            script_pubkey: ScriptBuf::new(),
        })
        .collect();

    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    }
}

/// A one-input transaction whose output `vout` pays `value` to `script_pubkey`; outputs before
/// `vout` are zero-value filler.
pub fn funding_tx_with_output(script_pubkey: ScriptBuf, value: Amount, vout: u32) -> Transaction {
    let mut tx = create_dummy_tx(1, vout as usize + 1);
    tx.output[vout as usize] = TxOut {
        value,
        script_pubkey,
    };
    tx
}
