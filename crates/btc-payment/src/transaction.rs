use bitcoin::absolute::LockTime;
use bitcoin::ecdsa;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::{Message, Secp256k1};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, PublicKey, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use tracing::debug;

use crate::address::parse_address;
use crate::error::BtcError;
use crate::signer::SigningIdentity;
use crate::utxo::{
    embedded_data_script, select_inputs_and_outputs, Destination, Payment, Selection, Utxo,
};

/// A transaction under construction: inputs bound to the outputs they spend,
/// signatures collected as partial signatures until finalization.
pub type TransactionSkeleton = Psbt;

/// A fully signed transaction and its consensus serialization.
#[derive(Debug, Clone)]
pub struct FinalizedTransaction {
    pub tx: Transaction,
    /// Lowercase hex of the consensus encoding, as expected by broadcast.
    pub hex: String,
}

impl FinalizedTransaction {
    pub fn txid(&self) -> Txid {
        self.tx.compute_txid()
    }
}

/// Build the unsigned skeleton for a selection.
///
/// Every input is bound to the signer's locking script and the spent value,
/// which the segwit sighash commits to. Change outputs pay the signer's own
/// address; embedded payloads become a zero-value `OP_RETURN` output.
pub fn assemble(
    signer: &SigningIdentity,
    selection: &Selection,
) -> Result<TransactionSkeleton, BtcError> {
    if selection.inputs.is_empty() {
        return Err(BtcError::TransactionBuildError("selection has no inputs".into()));
    }

    let mut inputs = Vec::with_capacity(selection.inputs.len());
    let mut prevouts = Vec::with_capacity(selection.inputs.len());

    for utxo in &selection.inputs {
        inputs.push(TxIn {
            previous_output: utxo.outpoint()?,
            script_sig: ScriptBuf::new(), // Empty for segwit.
            sequence: Sequence::MAX,
            witness: Witness::default(),
        });

        prevouts.push(TxOut {
            value: Amount::from_sat(utxo.amount_sat),
            script_pubkey: signer.output_script().clone(),
        });
    }

    let mut embedded = 0usize;
    let mut outputs = Vec::with_capacity(selection.outputs.len());

    for output in &selection.outputs {
        let script_pubkey = match &output.destination {
            Some(Destination::Address(address)) => {
                parse_address(address, signer.network())?.script_pubkey()
            }
            Some(Destination::Embedded(data)) => {
                embedded += 1;
                if embedded > 1 || output.amount_sat != 0 {
                    return Err(BtcError::InvalidPayment(
                        "embedded data must be a single zero-value output".into(),
                    ));
                }
                embedded_data_script(data)?
            }
            None => signer.output_script().clone(),
        };

        outputs.push(TxOut {
            value: Amount::from_sat(output.amount_sat),
            script_pubkey,
        });
    }

    let tx = Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: inputs,
        output: outputs,
    };

    let mut skeleton = Psbt::from_unsigned_tx(tx)
        .map_err(|e| BtcError::TransactionBuildError(format!("invalid skeleton: {e}")))?;

    for (input, prevout) in skeleton.inputs.iter_mut().zip(prevouts) {
        input.witness_utxo = Some(prevout);
    }

    Ok(skeleton)
}

/// Sign every input locked to the signer's script. Returns how many inputs
/// were signed; inputs locked to anything else are left for finalization to
/// reject.
pub fn sign(signer: &SigningIdentity, skeleton: &mut TransactionSkeleton) -> Result<usize, BtcError> {
    let secp = Secp256k1::new();
    let public_key = PublicKey::from(*signer.public_key());
    let unsigned_tx = skeleton.unsigned_tx.clone();
    let mut sighash_cache = SighashCache::new(&unsigned_tx);
    let mut signed = 0usize;

    for (input_index, input) in skeleton.inputs.iter_mut().enumerate() {
        let Some(prevout) = input.witness_utxo.as_ref() else {
            continue;
        };
        if &prevout.script_pubkey != signer.output_script() {
            continue;
        }

        let sighash = sighash_cache
            .p2wpkh_signature_hash(
                input_index,
                &prevout.script_pubkey,
                prevout.value,
                EcdsaSighashType::All,
            )
            .map_err(|e| BtcError::SigningError(format!("sighash computation failed: {e}")))?;

        let msg = Message::from_digest(sighash.to_byte_array());
        let signature = secp.sign_ecdsa(&msg, signer.secret_key());

        input
            .partial_sigs
            .insert(public_key, ecdsa::Signature::sighash_all(signature));
        signed += 1;
    }

    Ok(signed)
}

/// Attach `[signature, pubkey]` witnesses to every input.
///
/// All witnesses are built before any is attached: if one input cannot be
/// satisfied the skeleton is left untouched.
pub fn finalize(signer: &SigningIdentity, skeleton: &mut TransactionSkeleton) -> Result<(), BtcError> {
    let public_key = PublicKey::from(*signer.public_key());
    let mut witnesses = Vec::with_capacity(skeleton.inputs.len());

    for (input_index, input) in skeleton.inputs.iter().enumerate() {
        let prevout = input.witness_utxo.as_ref().ok_or_else(|| {
            BtcError::Finalization(format!("input {input_index} has no bound output"))
        })?;

        if !prevout.script_pubkey.is_p2wpkh() {
            return Err(BtcError::Finalization(format!(
                "input {input_index} is not a P2WPKH output"
            )));
        }
        if &prevout.script_pubkey != signer.output_script() {
            return Err(BtcError::Finalization(format!(
                "input {input_index} is locked to a different key"
            )));
        }

        let signature = input.partial_sigs.get(&public_key).ok_or_else(|| {
            BtcError::Finalization(format!("input {input_index} has no signature"))
        })?;

        let mut witness = Witness::new();
        witness.push(signature.to_vec());
        witness.push(signer.public_key().to_bytes());
        witnesses.push(witness);
    }

    for (input, witness) in skeleton.inputs.iter_mut().zip(witnesses) {
        input.final_script_witness = Some(witness);
        input.partial_sigs.clear();
    }

    Ok(())
}

/// Assemble, sign, and finalize a selection, returning the broadcastable
/// transaction.
///
/// A single key signs every input; nothing but the signer's own P2WPKH
/// outputs can be spent.
pub fn assemble_sign_and_serialize(
    signer: &SigningIdentity,
    selection: &Selection,
) -> Result<FinalizedTransaction, BtcError> {
    let mut skeleton = assemble(signer, selection)?;
    sign(signer, &mut skeleton)?;
    finalize(signer, &mut skeleton)?;

    let tx = skeleton
        .extract_tx()
        .map_err(|e| BtcError::Finalization(format!("extraction failed: {e}")))?;
    let hex = bitcoin::consensus::encode::serialize_hex(&tx);

    debug!(
        txid = %tx.compute_txid(),
        inputs = tx.input.len(),
        outputs = tx.output.len(),
        vsize = tx.vsize(),
        "finalized transaction"
    );

    Ok(FinalizedTransaction { tx, hex })
}

/// Select inputs for `payments` (plus an optional embedded payload, placed
/// after the payments) and produce the finalized transaction.
pub fn build_transaction(
    signer: &SigningIdentity,
    candidates: &[Utxo],
    payments: &[Payment],
    embedded_data: Option<&[u8]>,
    fee_rate_sat_vbyte: u64,
) -> Result<FinalizedTransaction, BtcError> {
    let mut targets = payments.to_vec();
    if let Some(data) = embedded_data {
        targets.push(Payment::embedded(data));
    }

    let selection = select_inputs_and_outputs(candidates, &targets, fee_rate_sat_vbyte)?;
    assemble_sign_and_serialize(signer, &selection)
}

/// Decode a hex-encoded transaction.
pub fn decode_transaction(tx_hex: &str) -> Result<Transaction, BtcError> {
    let bytes = hex::decode(tx_hex)
        .map_err(|e| BtcError::TransactionBuildError(format!("invalid hex: {e}")))?;
    bitcoin::consensus::deserialize(&bytes)
        .map_err(|e| BtcError::TransactionBuildError(format!("invalid transaction: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fee::MAX_FEE_RATE_SAT_VBYTE;
    use crate::network::BtcNetwork;
    use crate::signer::resolve_signer;
    use bitcoin::secp256k1::ecdsa::Signature as EcdsaSignature;

    const MAINNET_RECIPIENT: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

    fn testnet_signer() -> SigningIdentity {
        resolve_signer(&[0x42; 32], BtcNetwork::Testnet).unwrap()
    }

    fn recipient_on(network: BtcNetwork) -> String {
        resolve_signer(&[0x07; 32], network).unwrap().address().to_string()
    }

    fn utxo(tag: &str, vout: u32, amount_sat: u64) -> Utxo {
        Utxo::new(tag.repeat(32), vout, amount_sat)
    }

    fn spent_value(tx: &Transaction) -> u64 {
        tx.output.iter().map(|o| o.value.to_sat()).sum()
    }

    #[test]
    fn assemble_binds_signer_script_and_value() {
        let signer = testnet_signer();
        let selection = select_inputs_and_outputs(
            &[utxo("ab", 3, 200_000)],
            &[Payment::to_address(recipient_on(BtcNetwork::Testnet), 100_000)],
            2,
        )
        .unwrap();

        let skeleton = assemble(&signer, &selection).unwrap();
        let bound = skeleton.inputs[0].witness_utxo.as_ref().unwrap();
        assert_eq!(&bound.script_pubkey, signer.output_script());
        assert_eq!(bound.value.to_sat(), 200_000);
        assert_eq!(skeleton.unsigned_tx.input[0].previous_output.vout, 3);
        assert_eq!(skeleton.unsigned_tx.input[0].sequence, Sequence::MAX);
    }

    #[test]
    fn change_defaults_to_signer_address() {
        let signer = testnet_signer();
        let selection = select_inputs_and_outputs(
            &[utxo("ab", 0, 200_000)],
            &[Payment::to_address(recipient_on(BtcNetwork::Testnet), 100_000)],
            2,
        )
        .unwrap();
        assert!(selection.change().is_some());

        let skeleton = assemble(&signer, &selection).unwrap();
        let change = skeleton.unsigned_tx.output.last().unwrap();
        assert_eq!(&change.script_pubkey, signer.output_script());
        assert_eq!(change.value.to_sat(), selection.change().unwrap().amount_sat);
    }

    #[test]
    fn recipient_on_other_network_is_rejected() {
        let signer = testnet_signer();
        let selection = select_inputs_and_outputs(
            &[utxo("ab", 0, 200_000)],
            &[Payment::to_address(MAINNET_RECIPIENT, 50_000)],
            1,
        )
        .unwrap();

        let result = assemble_sign_and_serialize(&signer, &selection);
        assert!(matches!(result, Err(BtcError::InvalidAddress(_))));
    }

    #[test]
    fn signed_transaction_round_trips() {
        let signer = testnet_signer();
        let recipient = recipient_on(BtcNetwork::Testnet);
        let data = b"ion:3.QmExampleAnchorFileHash".to_vec();
        let candidates = [utxo("ab", 0, 60_000), utxo("cd", 1, 70_000)];

        let finalized = build_transaction(
            &signer,
            &candidates,
            &[Payment::to_address(&recipient, 120_000)],
            Some(data.as_slice()),
            5,
        )
        .unwrap();

        let decoded = decode_transaction(&finalized.hex).unwrap();
        assert_eq!(decoded, finalized.tx);
        assert_eq!(decoded.compute_txid(), finalized.txid());

        let mut spent: Vec<_> = decoded.input.iter().map(|i| i.previous_output).collect();
        spent.sort();
        let mut expected: Vec<_> = candidates.iter().map(|u| u.outpoint().unwrap()).collect();
        expected.sort();
        assert_eq!(spent, expected);

        let recipient_script = parse_address(&recipient, BtcNetwork::Testnet)
            .unwrap()
            .script_pubkey();
        assert_eq!(decoded.output[0].script_pubkey, recipient_script);
        assert_eq!(decoded.output[0].value.to_sat(), 120_000);
        assert_eq!(decoded.output[1].script_pubkey, embedded_data_script(&data).unwrap());
        assert_eq!(decoded.output[1].value, Amount::ZERO);
    }

    #[test]
    fn embedded_output_present_only_when_requested() {
        let signer = testnet_signer();
        let recipient = recipient_on(BtcNetwork::Testnet);
        let candidates = [utxo("ab", 0, 100_000)];
        let payments = [Payment::to_address(&recipient, 1)];

        let with_data =
            build_transaction(&signer, &candidates, &payments, Some(&b"did:ion:anchor"[..]), 55).unwrap();
        let without = build_transaction(&signer, &candidates, &payments, None, 55).unwrap();

        let zero_outputs = |tx: &Transaction| {
            tx.output
                .iter()
                .filter(|o| o.value == Amount::ZERO && o.script_pubkey.is_op_return())
                .count()
        };
        assert_eq!(zero_outputs(&with_data.tx), 1);
        assert_eq!(zero_outputs(&without.tx), 0);
    }

    #[test]
    fn anchoring_scenario_spends_exactly_the_utxo() {
        let signer = testnet_signer();
        let candidates = [utxo("ab", 0, 100_000)];
        let payments = [Payment::to_address(recipient_on(BtcNetwork::Testnet), 1)];
        let data = vec![0x69; 40];

        let mut targets = payments.to_vec();
        targets.push(Payment::embedded(data.clone()));
        let selection = select_inputs_and_outputs(&candidates, &targets, 55).unwrap();
        let finalized = assemble_sign_and_serialize(&signer, &selection).unwrap();

        let tx = &finalized.tx;
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.output.len(), 3);
        assert_eq!(tx.output[0].value.to_sat(), 1);
        assert!(tx.output[1].script_pubkey.is_op_return());
        assert_eq!(&tx.output[2].script_pubkey, signer.output_script());
        assert_eq!(spent_value(tx) + selection.fee_sat, 100_000);
        // Signatures are sized at their maximum in the estimate.
        assert!(tx.vsize() as u64 <= selection.vsize);
    }

    #[test]
    fn witnesses_carry_valid_signatures() {
        let signer = testnet_signer();
        let candidates = [utxo("ab", 0, 30_000), utxo("cd", 0, 30_000), utxo("ef", 2, 30_000)];
        let selection = select_inputs_and_outputs(
            &candidates,
            &[Payment::to_address(recipient_on(BtcNetwork::Testnet), 75_000)],
            3,
        )
        .unwrap();
        let finalized = assemble_sign_and_serialize(&signer, &selection).unwrap();
        let tx = &finalized.tx;
        assert_eq!(tx.input.len(), 3);

        let secp = Secp256k1::verification_only();
        let mut cache = SighashCache::new(tx);
        for (index, utxo) in selection.inputs.iter().enumerate() {
            let witness = &tx.input[index].witness;
            assert_eq!(witness.len(), 2);

            let sig_bytes = witness.nth(0).unwrap();
            let (sighash_byte, der) = sig_bytes.split_last().unwrap();
            assert_eq!(*sighash_byte, EcdsaSighashType::All as u8);
            assert_eq!(witness.nth(1).unwrap(), &signer.public_key().to_bytes()[..]);

            let sighash = cache
                .p2wpkh_signature_hash(
                    index,
                    signer.output_script(),
                    Amount::from_sat(utxo.amount_sat),
                    EcdsaSighashType::All,
                )
                .unwrap();
            let msg = Message::from_digest(sighash.to_byte_array());
            let sig = EcdsaSignature::from_der(der).unwrap();
            assert!(secp.verify_ecdsa(&msg, &sig, &signer.public_key().0).is_ok());
        }
    }

    #[test]
    fn finalization_is_atomic() {
        let signer = testnet_signer();
        let other = resolve_signer(&[0x09; 32], BtcNetwork::Testnet).unwrap();
        let selection = select_inputs_and_outputs(
            &[utxo("ab", 0, 30_000), utxo("cd", 0, 30_000)],
            &[Payment::to_address(recipient_on(BtcNetwork::Testnet), 55_000)],
            1,
        )
        .unwrap();
        assert_eq!(selection.inputs.len(), 2);

        let mut skeleton = assemble(&signer, &selection).unwrap();
        // Second input claims to spend someone else's output.
        skeleton.inputs[1].witness_utxo.as_mut().unwrap().script_pubkey =
            other.output_script().clone();

        assert_eq!(sign(&signer, &mut skeleton).unwrap(), 1);
        let result = finalize(&signer, &mut skeleton);
        assert!(matches!(result, Err(BtcError::Finalization(_))));
        assert!(skeleton.inputs.iter().all(|i| i.final_script_witness.is_none()));
    }

    #[test]
    fn finalizing_unsigned_skeleton_fails() {
        let signer = testnet_signer();
        let selection = select_inputs_and_outputs(
            &[utxo("ab", 0, 30_000)],
            &[Payment::to_address(recipient_on(BtcNetwork::Testnet), 10_000)],
            1,
        )
        .unwrap();
        let mut skeleton = assemble(&signer, &selection).unwrap();
        let result = finalize(&signer, &mut skeleton);
        assert!(matches!(result, Err(BtcError::Finalization(_))));
    }

    #[test]
    fn non_witness_input_is_unsatisfiable() {
        let signer = testnet_signer();
        let selection = select_inputs_and_outputs(
            &[utxo("ab", 0, 30_000)],
            &[Payment::to_address(recipient_on(BtcNetwork::Testnet), 10_000)],
            1,
        )
        .unwrap();
        let mut skeleton = assemble(&signer, &selection).unwrap();
        skeleton.inputs[0].witness_utxo.as_mut().unwrap().script_pubkey =
            ScriptBuf::from_bytes(vec![0x51]);

        assert_eq!(sign(&signer, &mut skeleton).unwrap(), 0);
        let err = finalize(&signer, &mut skeleton).unwrap_err();
        assert!(err.to_string().contains("not a P2WPKH"));
    }

    #[test]
    fn fee_matches_selection() {
        let signer = resolve_signer(&[0x42; 32], BtcNetwork::Liquid).unwrap();
        let recipient = recipient_on(BtcNetwork::Liquid);
        let selection = select_inputs_and_outputs(
            &[utxo("ab", 0, 500_000)],
            &[Payment::to_address(&recipient, 123_456)],
            55,
        )
        .unwrap();
        let finalized = assemble_sign_and_serialize(&signer, &selection).unwrap();
        assert_eq!(500_000 - spent_value(&finalized.tx), selection.fee_sat);
        assert!(finalized.hex.starts_with("02000000"));
    }

    #[test]
    fn invalid_txid_fails_assembly() {
        let signer = testnet_signer();
        let selection = Selection {
            inputs: vec![Utxo::new("not-a-txid", 0, 10_000)],
            outputs: vec![],
            fee_sat: 10_000,
            vsize: 0,
        };
        let result = assemble(&signer, &selection);
        assert!(matches!(result, Err(BtcError::TransactionBuildError(_))));
    }

    #[test]
    fn max_fee_rate_with_change_extracts() {
        let signer = testnet_signer();
        let payments = [Payment::to_address(recipient_on(BtcNetwork::Testnet), 1)];
        let finalized = build_transaction(
            &signer,
            &[utxo("ab", 0, 100_000_000)],
            &payments,
            None,
            MAX_FEE_RATE_SAT_VBYTE,
        )
        .unwrap();
        assert_eq!(finalized.tx.output.len(), 2);
    }

    #[test]
    fn max_fee_rate_with_absorbed_leftover_extracts() {
        let signer = testnet_signer();
        // One input plus a 3-byte OP_RETURN is 93 vB, a 930 000 sat fee.
        // A change output would raise it to 1 240 000 and leave 370 000,
        // under the 680 000 threshold, so the whole UTXO becomes fee.
        let candidates = [utxo("ab", 0, 1_610_000)];
        let selection = select_inputs_and_outputs(
            &candidates,
            &[Payment::embedded(b"did".to_vec())],
            MAX_FEE_RATE_SAT_VBYTE,
        )
        .unwrap();
        assert!(selection.change().is_none());
        assert_eq!(selection.fee_sat, 1_610_000);

        let finalized = assemble_sign_and_serialize(&signer, &selection).unwrap();
        let effective = selection.fee_sat / finalized.tx.vsize() as u64;
        assert!(effective > MAX_FEE_RATE_SAT_VBYTE);
        assert!(effective < 25_000);
    }

    #[test]
    fn fee_rate_above_cap_is_rejected_before_signing() {
        let signer = testnet_signer();
        let payments = [Payment::to_address(recipient_on(BtcNetwork::Testnet), 1)];
        let result = build_transaction(
            &signer,
            &[utxo("ab", 0, 100_000_000)],
            &payments,
            None,
            25_000,
        );
        assert!(matches!(result, Err(BtcError::InvalidPayment(_))));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_transaction("zz").is_err());
        assert!(decode_transaction("0200").is_err());
    }
}
