use bitcoin::absolute::LockTime;
use bitcoin::script::ScriptBuf;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::error::BtcError;

/// Fee rate used when the caller does not configure one.
pub const DEFAULT_FEE_RATE_SAT_VBYTE: u64 = 55;

/// Virtual size of a P2WPKH input: 41 base bytes plus a 108 weight-unit
/// witness (count, 72-byte signature, 33-byte key), rounded up.
pub const P2WPKH_INPUT_VBYTES: u64 = 68;

/// Highest fee rate a selection accepts.
///
/// Leftover below the change threshold is absorbed into the fee, which can
/// push the effective rate of a small transaction to roughly twice the
/// requested one. This cap keeps that worst case under the 25 000 sat/vB
/// absurd-fee limit enforced at extraction.
pub const MAX_FEE_RATE_SAT_VBYTE: u64 = 10_000;

/// Smallest P2WPKH output relay policy accepts.
pub const P2WPKH_DUST_LIMIT_SAT: u64 = 294;

/// Worst-case DER signature plus sighash byte.
const MAX_SIGNATURE_LEN: usize = 72;

const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Estimate the virtual size of a transaction spending `num_inputs` P2WPKH
/// inputs into `outputs`.
///
/// Witness bytes are counted at a quarter of their weight. Signatures are
/// sized at their maximum, so the estimate never undercuts the signed size.
pub fn estimate_vsize(num_inputs: usize, outputs: &[TxOut]) -> u64 {
    let witness = Witness::from_slice(&[
        &[0u8; MAX_SIGNATURE_LEN][..],
        &[0u8; COMPRESSED_PUBKEY_LEN][..],
    ]);

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: (0..num_inputs)
            .map(|_| TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: witness.clone(),
            })
            .collect(),
        output: outputs.to_vec(),
    };

    tx.vsize() as u64
}

/// Fee for a transaction of the estimated size at `fee_rate_sat_vbyte`.
/// Saturates at `u64::MAX`, a fee no set of UTXOs can cover.
pub fn estimate_fee(num_inputs: usize, outputs: &[TxOut], fee_rate_sat_vbyte: u64) -> u64 {
    estimate_vsize(num_inputs, outputs).saturating_mul(fee_rate_sat_vbyte)
}

/// Cost of spending one additional P2WPKH input at `fee_rate_sat_vbyte`.
pub fn input_fee(fee_rate_sat_vbyte: u64) -> u64 {
    P2WPKH_INPUT_VBYTES.saturating_mul(fee_rate_sat_vbyte)
}

/// Reject fee rates outside `1..=MAX_FEE_RATE_SAT_VBYTE`.
pub fn check_fee_rate(fee_rate_sat_vbyte: u64) -> Result<(), BtcError> {
    if fee_rate_sat_vbyte == 0 || fee_rate_sat_vbyte > MAX_FEE_RATE_SAT_VBYTE {
        return Err(BtcError::InvalidPayment(format!(
            "fee rate {fee_rate_sat_vbyte} sat/vB outside 1..={MAX_FEE_RATE_SAT_VBYTE}"
        )));
    }
    Ok(())
}

/// Minimum value worth returning as change: what it costs to spend it later,
/// never below the P2WPKH dust limit.
pub fn change_threshold(fee_rate_sat_vbyte: u64) -> u64 {
    input_fee(fee_rate_sat_vbyte).max(P2WPKH_DUST_LIMIT_SAT)
}

/// Placeholder output of the signer's change script, used for sizing.
pub(crate) fn change_placeholder(script_pubkey: ScriptBuf) -> TxOut {
    TxOut {
        value: Amount::ZERO,
        script_pubkey,
    }
}
