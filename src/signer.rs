//! Transaction signer
//!
//! Classifies the previous output being spent, selects the signature
//! version and script code that classification implies, signs with the
//! caller's secret keys, and assembles the unlock script and/or witness.
//!
//! The signer owns its transaction and mutates only the input being signed.
//! Each `sign_input` call builds a fresh sighash engine, so digests always
//! reflect the current transaction state.

use secp256k1::{Keypair, PublicKey, SecretKey};

use crate::crypto::{hash160, secp, sha256, sign_ecdsa, sign_schnorr, tweak_keypair};
use crate::error::SignerError;
use crate::opcodes::{OP_0, OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160};
use crate::operation::write_push;
use crate::sighash::{SighashCache, SighashType, SIGHASH_DEFAULT};
use crate::template::{classify, ScriptTemplate};
use crate::types::{ByteString, Transaction, TransactionOutput, Witness};

/// Signs transaction inputs against their previous outputs.
///
/// Not safe for concurrent use; independent signers on independent
/// transactions are. Callers needing the unsigned transaction afterwards
/// should clone before constructing the signer.
pub struct TransactionSigner<'a> {
    tx: Transaction,
    prevouts: &'a [TransactionOutput],
}

impl<'a> TransactionSigner<'a> {
    pub fn new(tx: Transaction, prevouts: &'a [TransactionOutput]) -> Result<Self, SignerError> {
        if prevouts.len() != tx.inputs.len() {
            return Err(SignerError::MissingPreviousOutput(prevouts.len()));
        }
        Ok(TransactionSigner { tx, prevouts })
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn into_transaction(self) -> Transaction {
        self.tx
    }

    /// Sign one input.
    ///
    /// `keys` holds the secret keys in the order the template consumes them
    /// (one for single-key templates, the threshold count for multisig).
    /// `script` supplies the redeem script for P2SH spends or the witness
    /// script for P2WSH spends; for a P2SH-wrapped P2WSH, pass the witness
    /// script and the wrapper is reconstructed from its hash.
    pub fn sign_input(
        &mut self,
        input_index: usize,
        keys: &[SecretKey],
        script: Option<&[u8]>,
        sighash_type: SighashType,
    ) -> Result<(), SignerError> {
        if input_index >= self.tx.inputs.len() {
            return Err(SignerError::InvalidInputIndex(input_index));
        }
        if keys.is_empty() {
            return Err(SignerError::InvalidSecretKey);
        }

        let prevout = &self.prevouts[input_index];
        match classify(&prevout.script_pubkey) {
            ScriptTemplate::PayToPubkey { .. } => {
                let signature = self.legacy_signature(
                    input_index,
                    &prevout.script_pubkey,
                    &keys[0],
                    sighash_type,
                )?;
                let mut unlock = Vec::new();
                write_push(&mut unlock, &signature);
                self.set_unlock(input_index, unlock, Vec::new());
            }
            ScriptTemplate::PayToPubkeyHash { .. } => {
                let pubkey = PublicKey::from_secret_key(secp(), &keys[0]);
                let signature = self.legacy_signature(
                    input_index,
                    &prevout.script_pubkey,
                    &keys[0],
                    sighash_type,
                )?;
                let mut unlock = Vec::new();
                write_push(&mut unlock, &signature);
                write_push(&mut unlock, &pubkey.serialize());
                self.set_unlock(input_index, unlock, Vec::new());
            }
            ScriptTemplate::Multisig { .. } => {
                let unlock = self.multisig_unlock(
                    input_index,
                    &prevout.script_pubkey,
                    keys,
                    sighash_type,
                    None,
                )?;
                self.set_unlock(input_index, unlock, Vec::new());
            }
            ScriptTemplate::PayToWitnessPubkeyHash { .. } => {
                let witness = self.witness_keyhash_spend(input_index, &keys[0], sighash_type)?;
                self.set_unlock(input_index, Vec::new(), witness);
            }
            ScriptTemplate::PayToScriptHash { script_hash } => {
                self.sign_script_hash(input_index, keys, script, sighash_type, script_hash)?;
            }
            ScriptTemplate::PayToWitnessScriptHash { script_hash } => {
                let witness_script =
                    script.ok_or(SignerError::UnsupportedScriptTemplate)?;
                if sha256(witness_script) != script_hash {
                    return Err(SignerError::ScriptHashMismatch);
                }
                let witness =
                    self.witness_script_spend(input_index, witness_script, keys, sighash_type)?;
                self.set_unlock(input_index, Vec::new(), witness);
            }
            ScriptTemplate::PayToTaproot { .. } => {
                let witness = self.taproot_key_spend(input_index, &keys[0], sighash_type)?;
                self.set_unlock(input_index, Vec::new(), witness);
            }
            ScriptTemplate::NullData | ScriptTemplate::NonStandard => {
                return Err(SignerError::UnsupportedScriptTemplate);
            }
        }
        Ok(())
    }

    /// P2SH dispatch: the supplied script is either the redeem script
    /// itself or, for a nested P2WSH, the witness script whose wrapper
    /// hashes to the committed script hash.
    fn sign_script_hash(
        &mut self,
        input_index: usize,
        keys: &[SecretKey],
        script: Option<&[u8]>,
        sighash_type: SighashType,
        script_hash: [u8; 20],
    ) -> Result<(), SignerError> {
        let script = script.ok_or(SignerError::UnsupportedScriptTemplate)?;

        if hash160(script) == script_hash {
            let redeem = script.to_vec();
            match classify(&redeem) {
                ScriptTemplate::PayToWitnessPubkeyHash { .. } => {
                    let witness =
                        self.witness_keyhash_spend(input_index, &keys[0], sighash_type)?;
                    let mut unlock = Vec::new();
                    write_push(&mut unlock, &redeem);
                    self.set_unlock(input_index, unlock, witness);
                    return Ok(());
                }
                ScriptTemplate::Multisig { .. } => {
                    let unlock = self.multisig_unlock(
                        input_index,
                        &redeem,
                        keys,
                        sighash_type,
                        Some(&redeem),
                    )?;
                    self.set_unlock(input_index, unlock, Vec::new());
                    return Ok(());
                }
                _ => return Err(SignerError::UnsupportedScriptTemplate),
            }
        }

        // Nested P2SH(P2WSH): the caller supplied the witness script
        let wrapper = p2wsh_script(&sha256(script));
        if hash160(&wrapper) == script_hash {
            let witness = self.witness_script_spend(input_index, script, keys, sighash_type)?;
            let mut unlock = Vec::new();
            write_push(&mut unlock, &wrapper);
            self.set_unlock(input_index, unlock, witness);
            return Ok(());
        }

        Err(SignerError::ScriptHashMismatch)
    }

    /// Witness for a P2WPKH (or nested) spend: `[signature, pubkey]`.
    fn witness_keyhash_spend(
        &self,
        input_index: usize,
        key: &SecretKey,
        sighash_type: SighashType,
    ) -> Result<Witness, SignerError> {
        let pubkey = PublicKey::from_secret_key(secp(), key);
        let script_code = p2pkh_script(&hash160(&pubkey.serialize()));
        let signature =
            self.segwit_v0_signature(input_index, &script_code, key, sighash_type)?;
        Ok(vec![signature, pubkey.serialize().to_vec()])
    }

    /// Witness for a P2WSH multisig spend:
    /// `[empty, sig1, .., sigN, witness script]`.
    fn witness_script_spend(
        &self,
        input_index: usize,
        witness_script: &[u8],
        keys: &[SecretKey],
        sighash_type: SighashType,
    ) -> Result<Witness, SignerError> {
        if !matches!(classify(witness_script), ScriptTemplate::Multisig { .. }) {
            return Err(SignerError::UnsupportedScriptTemplate);
        }
        // CHECKMULTISIG consumes one element past the signatures; the
        // witness carries the dummy as a literal empty element
        let mut witness: Witness = vec![Vec::new()];
        for key in keys {
            witness.push(self.segwit_v0_signature(
                input_index,
                witness_script,
                key,
                sighash_type,
            )?);
        }
        witness.push(witness_script.to_vec());
        Ok(witness)
    }

    /// Taproot key-path witness: a single Schnorr signature under the
    /// tweaked output key.
    fn taproot_key_spend(
        &self,
        input_index: usize,
        key: &SecretKey,
        sighash_type: SighashType,
    ) -> Result<Witness, SignerError> {
        let keypair = Keypair::from_secret_key(secp(), key);
        let tweaked = tweak_keypair(&keypair, None)?;

        let mut cache = SighashCache::new(&self.tx, self.prevouts);
        let digest =
            cache.taproot_signature_hash(input_index, sighash_type, None, None)?;

        let mut signature = sign_schnorr(&digest, &tweaked).to_vec();
        // The default type is encoded by omission; any other type rides as
        // a trailing byte
        if sighash_type.0 != SIGHASH_DEFAULT {
            signature.push(sighash_type.0);
        }
        Ok(vec![signature])
    }

    /// Unlock script for a multisig spend: `OP_0 <sig1> .. <sigN>` plus the
    /// redeem script push when spending through P2SH.
    fn multisig_unlock(
        &self,
        input_index: usize,
        script_code: &[u8],
        keys: &[SecretKey],
        sighash_type: SighashType,
        redeem: Option<&[u8]>,
    ) -> Result<ByteString, SignerError> {
        let mut unlock = vec![OP_0];
        for key in keys {
            let signature =
                self.legacy_signature(input_index, script_code, key, sighash_type)?;
            write_push(&mut unlock, &signature);
        }
        if let Some(redeem) = redeem {
            write_push(&mut unlock, redeem);
        }
        Ok(unlock)
    }

    fn legacy_signature(
        &self,
        input_index: usize,
        script_code: &[u8],
        key: &SecretKey,
        sighash_type: SighashType,
    ) -> Result<ByteString, SignerError> {
        let cache = SighashCache::new(&self.tx, self.prevouts);
        let digest = cache.legacy_signature_hash(input_index, script_code, sighash_type)?;
        let mut signature = sign_ecdsa(&digest, key);
        signature.push(sighash_type.0);
        Ok(signature)
    }

    fn segwit_v0_signature(
        &self,
        input_index: usize,
        script_code: &[u8],
        key: &SecretKey,
        sighash_type: SighashType,
    ) -> Result<ByteString, SignerError> {
        let amount = self.prevouts[input_index].value;
        let mut cache = SighashCache::new(&self.tx, self.prevouts);
        let digest =
            cache.segwit_v0_signature_hash(input_index, script_code, amount, sighash_type)?;
        let mut signature = sign_ecdsa(&digest, key);
        signature.push(sighash_type.0);
        Ok(signature)
    }

    fn set_unlock(&mut self, input_index: usize, script_sig: ByteString, witness: Witness) {
        let input = &mut self.tx.inputs[input_index];
        input.script_sig = script_sig;
        input.witness = witness;
    }
}

/// `DUP HASH160 <hash> EQUALVERIFY CHECKSIG`
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> ByteString {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, 0x14]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// `OP_0 <32-byte script hash>`
pub fn p2wsh_script(script_hash: &[u8; 32]) -> ByteString {
    let mut script = Vec::with_capacity(34);
    script.extend_from_slice(&[OP_0, 0x20]);
    script.extend_from_slice(script_hash);
    script
}

/// `OP_0 <20-byte key hash>`
pub fn p2wpkh_script(pubkey_hash: &[u8; 20]) -> ByteString {
    let mut script = Vec::with_capacity(22);
    script.extend_from_slice(&[OP_0, 0x14]);
    script.extend_from_slice(pubkey_hash);
    script
}
