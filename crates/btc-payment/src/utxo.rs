use bitcoin::hashes::Hash;
use bitcoin::script::{PushBytesBuf, ScriptBuf};
use bitcoin::{Amount, OutPoint, TxOut, Txid, WPubkeyHash};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::script_pubkey_unchecked;
use crate::error::BtcError;
use crate::fee::{
    change_placeholder, change_threshold, check_fee_rate, estimate_fee, estimate_vsize, input_fee,
};

/// Largest embedded payload accepted by standard relay policy.
pub const MAX_EMBEDDED_DATA_LEN: usize = 80;

/// A single unspent transaction output (UTXO) owned by the signer.
///
/// Deserializes from the Esplora `/address/{addr}/utxo` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Transaction ID as a hex string (big-endian / display order).
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
    /// Value in satoshis.
    #[serde(rename = "value")]
    pub amount_sat: u64,
}

impl Utxo {
    pub fn new(txid: impl Into<String>, vout: u32, amount_sat: u64) -> Self {
        Self {
            txid: txid.into(),
            vout,
            amount_sat,
        }
    }

    /// The outpoint this UTXO is spent through.
    pub fn outpoint(&self) -> Result<OutPoint, BtcError> {
        let txid: Txid = self
            .txid
            .parse()
            .map_err(|e| BtcError::TransactionBuildError(format!("invalid txid {}: {e}", self.txid)))?;
        Ok(OutPoint::new(txid, self.vout))
    }
}

/// Where a payment goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A spendable output to a bech32 witness-program address.
    Address(String),
    /// A zero-value `OP_RETURN` output carrying application data.
    Embedded(Vec<u8>),
}

/// One desired transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub destination: Destination,
    pub amount_sat: u64,
}

impl Payment {
    pub fn to_address(address: impl Into<String>, amount_sat: u64) -> Self {
        Self {
            destination: Destination::Address(address.into()),
            amount_sat,
        }
    }

    pub fn embedded(data: impl Into<Vec<u8>>) -> Self {
        Self {
            destination: Destination::Embedded(data.into()),
            amount_sat: 0,
        }
    }
}

/// An output chosen by selection. `destination` is `None` for the change
/// output, which pays back to the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedOutput {
    pub destination: Option<Destination>,
    pub amount_sat: u64,
}

impl SelectedOutput {
    pub fn is_change(&self) -> bool {
        self.destination.is_none()
    }
}

/// Result of coin selection.
#[derive(Debug, Clone)]
pub struct Selection {
    /// Inputs in spending order.
    pub inputs: Vec<Utxo>,
    /// Targets in request order, followed by the change output if any.
    pub outputs: Vec<SelectedOutput>,
    /// Fee paid: inputs minus outputs.
    pub fee_sat: u64,
    /// Estimated virtual size the fee was computed from.
    pub vsize: u64,
}

impl Selection {
    pub fn total_input_sat(&self) -> u64 {
        self.inputs.iter().map(|u| u.amount_sat).sum()
    }

    pub fn total_output_sat(&self) -> u64 {
        self.outputs.iter().map(|o| o.amount_sat).sum()
    }

    pub fn change(&self) -> Option<&SelectedOutput> {
        self.outputs.iter().find(|o| o.is_change())
    }
}

/// `OP_RETURN <data>` locking script for an embedded payload.
pub fn embedded_data_script(data: &[u8]) -> Result<ScriptBuf, BtcError> {
    if data.len() > MAX_EMBEDDED_DATA_LEN {
        return Err(BtcError::InvalidPayment(format!(
            "embedded data is {} bytes, limit is {MAX_EMBEDDED_DATA_LEN}",
            data.len()
        )));
    }
    let push = PushBytesBuf::try_from(data.to_vec())
        .map_err(|e| BtcError::InvalidPayment(format!("embedded data not pushable: {e}")))?;
    Ok(ScriptBuf::new_op_return(&push))
}

/// Validate targets and turn them into outputs for size estimation.
fn target_outputs(targets: &[Payment]) -> Result<Vec<TxOut>, BtcError> {
    if targets.is_empty() {
        return Err(BtcError::InvalidPayment("no payment targets".into()));
    }

    let mut embedded = 0usize;
    let mut outputs = Vec::with_capacity(targets.len());

    for payment in targets {
        let script_pubkey = match &payment.destination {
            Destination::Address(address) => {
                if payment.amount_sat == 0 {
                    return Err(BtcError::InvalidPayment(format!(
                        "payment to {address} has zero value"
                    )));
                }
                script_pubkey_unchecked(address)?
            }
            Destination::Embedded(data) => {
                if payment.amount_sat != 0 {
                    return Err(BtcError::InvalidPayment(
                        "embedded data output must carry zero value".into(),
                    ));
                }
                embedded += 1;
                if embedded > 1 {
                    return Err(BtcError::InvalidPayment(
                        "at most one embedded data output per transaction".into(),
                    ));
                }
                embedded_data_script(data)?
            }
        };
        outputs.push(TxOut {
            value: Amount::from_sat(payment.amount_sat),
            script_pubkey,
        });
    }

    Ok(outputs)
}

/// Candidates worth more than the cost of spending them, largest first.
/// Ties are broken by txid and vout so selection is deterministic.
fn spendable_candidates(candidates: &[Utxo], fee_rate_sat_vbyte: u64) -> Vec<&Utxo> {
    let spend_cost = input_fee(fee_rate_sat_vbyte);
    let mut ordered: Vec<&Utxo> = candidates
        .iter()
        .filter(|u| u.amount_sat > spend_cost)
        .collect();
    ordered.sort_by(|a, b| {
        b.amount_sat
            .cmp(&a.amount_sat)
            .then_with(|| a.txid.cmp(&b.txid))
            .then_with(|| a.vout.cmp(&b.vout))
    });
    ordered
}

fn sum_sat<'a>(utxos: impl IntoIterator<Item = &'a Utxo>) -> u64 {
    utxos
        .into_iter()
        .fold(0u64, |acc, u| acc.saturating_add(u.amount_sat))
}

/// First pass: accumulate only UTXOs that keep the total within one change
/// threshold of the goal, so the transaction needs no change output.
fn select_exact<'a>(
    ordered: &[&'a Utxo],
    outputs: &[TxOut],
    target_sat: u64,
    fee_rate_sat_vbyte: u64,
) -> Option<Vec<&'a Utxo>> {
    let threshold = change_threshold(fee_rate_sat_vbyte);
    let mut selected: Vec<&Utxo> = Vec::new();
    let mut total_sat: u64 = 0;

    for &utxo in ordered {
        let fee = estimate_fee(selected.len() + 1, outputs, fee_rate_sat_vbyte);
        let goal = target_sat.saturating_add(fee);
        if total_sat.saturating_add(utxo.amount_sat) > goal.saturating_add(threshold) {
            continue;
        }

        selected.push(utxo);
        total_sat = total_sat.saturating_add(utxo.amount_sat);

        if total_sat >= goal {
            return Some(selected);
        }
    }

    None
}

/// Second pass: accumulate in order until the goal is covered.
fn select_accumulative<'a>(
    ordered: &[&'a Utxo],
    outputs: &[TxOut],
    target_sat: u64,
    fee_rate_sat_vbyte: u64,
) -> Option<Vec<&'a Utxo>> {
    let mut selected: Vec<&Utxo> = Vec::new();
    let mut total_sat: u64 = 0;

    for &utxo in ordered {
        selected.push(utxo);
        total_sat = total_sat.saturating_add(utxo.amount_sat);

        let fee = estimate_fee(selected.len(), outputs, fee_rate_sat_vbyte);
        if total_sat >= target_sat.saturating_add(fee) {
            return Some(selected);
        }
    }

    None
}

/// Select inputs covering `targets` plus the fee of the resulting transaction.
///
/// Candidates are tried largest first. A pass that avoids a change output is
/// attempted before falling back to plain accumulation. UTXOs worth less than
/// the cost of spending them are never selected. Fee rates outside
/// `1..=MAX_FEE_RATE_SAT_VBYTE` are rejected as [`BtcError::InvalidPayment`]. When the leftover exceeds
/// [`change_threshold`], a change output is appended and the fee is
/// recomputed for the larger transaction; otherwise the leftover goes to the
/// fee.
pub fn select_inputs_and_outputs(
    candidates: &[Utxo],
    targets: &[Payment],
    fee_rate_sat_vbyte: u64,
) -> Result<Selection, BtcError> {
    check_fee_rate(fee_rate_sat_vbyte)?;
    let outputs = target_outputs(targets)?;
    let target_sat = targets
        .iter()
        .try_fold(0u64, |acc, p| acc.checked_add(p.amount_sat))
        .ok_or_else(|| BtcError::InvalidPayment("payment total overflows".into()))?;

    if candidates.is_empty() {
        warn!(target_sat, "no UTXOs available");
        return Err(BtcError::NoViableSelection("no UTXOs available".into()));
    }

    let ordered = spendable_candidates(candidates, fee_rate_sat_vbyte);

    let (chosen, pass) = match select_exact(&ordered, &outputs, target_sat, fee_rate_sat_vbyte) {
        Some(chosen) => (chosen, "exact"),
        None => match select_accumulative(&ordered, &outputs, target_sat, fee_rate_sat_vbyte) {
            Some(chosen) => (chosen, "accumulative"),
            None => {
                let available = sum_sat(candidates);
                let fee = estimate_fee(ordered.len().max(1), &outputs, fee_rate_sat_vbyte);
                warn!(available, target_sat, fee, "insufficient funds for payment");
                return Err(BtcError::NoViableSelection(format!(
                    "insufficient funds: have {available} sat, need at least {} sat (target {target_sat} + fee {fee})",
                    target_sat.saturating_add(fee),
                )));
            }
        },
    };

    let selection = finalize_selection(chosen, targets, &outputs, target_sat, fee_rate_sat_vbyte);

    debug!(
        pass,
        inputs = selection.inputs.len(),
        outputs = selection.outputs.len(),
        fee_sat = selection.fee_sat,
        vsize = selection.vsize,
        change = selection.change().is_some(),
        "selected inputs"
    );

    Ok(selection)
}

fn finalize_selection(
    chosen: Vec<&Utxo>,
    targets: &[Payment],
    outputs: &[TxOut],
    target_sat: u64,
    fee_rate_sat_vbyte: u64,
) -> Selection {
    let inputs: Vec<Utxo> = chosen.into_iter().cloned().collect();
    let total_in = sum_sat(&inputs);

    let mut with_change = outputs.to_vec();
    with_change.push(change_placeholder(ScriptBuf::new_p2wpkh(
        &WPubkeyHash::all_zeros(),
    )));
    let fee_with_change = estimate_fee(inputs.len(), &with_change, fee_rate_sat_vbyte);

    let mut selected: Vec<SelectedOutput> = targets
        .iter()
        .map(|p| SelectedOutput {
            destination: Some(p.destination.clone()),
            amount_sat: p.amount_sat,
        })
        .collect();

    let change_sat = total_in
        .checked_sub(target_sat)
        .and_then(|left| left.checked_sub(fee_with_change));

    let vsize = match change_sat {
        Some(change_sat) if change_sat > change_threshold(fee_rate_sat_vbyte) => {
            selected.push(SelectedOutput {
                destination: None,
                amount_sat: change_sat,
            });
            estimate_vsize(inputs.len(), &with_change)
        }
        _ => estimate_vsize(inputs.len(), outputs),
    };

    let total_out: u64 = selected.iter().map(|o| o.amount_sat).sum();

    Selection {
        inputs,
        outputs: selected,
        fee_sat: total_in - total_out,
        vsize,
    }
}
