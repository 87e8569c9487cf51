//! Taproot leaf script lookup and leaf hashing over a PSBT.

use std::collections::BTreeMap;

use bitcoin::{
    psbt::Input,
    taproot::{LeafVersion, TapLeafHash},
    Psbt, Script, ScriptBuf, Witness,
};

use crate::errors::TaprootError;

/// Read access to the taproot leaf scripts of a PSBT's inputs.
///
/// Anything that can list, per input, the leaf scripts it carries can feed the leaf-hash
/// computations below; [`Psbt`] is the implementation used in practice.
pub trait PsbtView {
    /// Number of inputs.
    fn input_count(&self) -> usize;

    /// The leaf scripts carried by the input at `index`, in the container's order.
    fn leaf_scripts(&self, index: usize) -> Vec<(&Script, LeafVersion)>;
}

impl PsbtView for Psbt {
    fn input_count(&self) -> usize {
        self.inputs.len()
    }

    fn leaf_scripts(&self, index: usize) -> Vec<(&Script, LeafVersion)> {
        self.inputs
            .get(index)
            .map(|input| {
                input
                    .tap_scripts
                    .values()
                    .map(|(script, version)| (script.as_script(), *version))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Returns the first leaf script found while scanning the inputs in order.
///
/// A PSBT prepared for one of the staking script paths carries exactly one relevant leaf script
/// per signing round.
pub fn extract_leaf_script(psbt: &impl PsbtView) -> Option<ScriptBuf> {
    (0..psbt.input_count())
        .find_map(|index| psbt.leaf_scripts(index).into_iter().next())
        .map(|(script, _)| script.to_owned())
}

/// Computes the BIP341 leaf hash of a tapscript leaf.
///
/// This is `TaggedHash("TapLeaf", 0xc0 || CompactSize(len) || script)`.
pub fn leaf_hash(script: &Script) -> TapLeafHash {
    TapLeafHash::from_script(script, LeafVersion::TapScript)
}

/// Extracts the leaf script of a PSBT and hashes it.
///
/// # Errors
///
/// [`TaprootError::NoTaprootScript`] if no input carries a leaf script.
pub fn compute_leaf_hash(psbt: &impl PsbtView) -> Result<TapLeafHash, TaprootError> {
    extract_leaf_script(psbt)
        .map(|script| leaf_hash(&script))
        .ok_or(TaprootError::NoTaprootScript)
}

/// Finalizes a [`bitcoin::psbt::Input`].
///
/// This is done as per
/// <https://github.com/rust-bitcoin/rust-bitcoin/blob/bitcoin-0.32.1/bitcoin/examples/taproot-psbt.rs#L315-L327>.
pub fn finalize_input<D>(input: &mut Input, witnesses: impl IntoIterator<Item = D>)
where
    D: AsRef<[u8]>,
{
    let mut witness_stack = Witness::new();

    witnesses
        .into_iter()
        .for_each(|witness| witness_stack.push(witness));

    input.final_script_witness = Some(witness_stack);

    // Clear every field that only matters before finalization (BIP174).
    input.partial_sigs = BTreeMap::new();
    input.sighash_type = None;
    input.redeem_script = None;
    input.witness_script = None;
    input.bip32_derivation = BTreeMap::new();
    input.tap_key_sig = None;
    input.tap_script_sigs = BTreeMap::new();
    input.tap_scripts = BTreeMap::new();
    input.tap_key_origins = BTreeMap::new();
    input.tap_internal_key = None;
    input.tap_merkle_root = None;
}
