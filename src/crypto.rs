//! Hashing and signature primitives
//!
//! The curve arithmetic itself comes from the `secp256k1` crate; this module
//! wraps it with the encoding rules scripts enforce (strict DER, low-S,
//! x-only keys) and provides the hash constructions the protocol commits to.

use std::sync::OnceLock;

use ripemd::Ripemd160;
use secp256k1::ecdsa::Signature as EcdsaSignature;
use secp256k1::schnorr::Signature as SchnorrSignature;
use secp256k1::{
    All, Keypair, Message, Parity, PublicKey, Scalar, Secp256k1, SecretKey, XOnlyPublicKey,
};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::ScriptError;
use crate::types::Hash;

/// Shared verification/signing context. Context creation is expensive and
/// the context is stateless, so one per process suffices.
pub fn secp() -> &'static Secp256k1<All> {
    static CONTEXT: OnceLock<Secp256k1<All>> = OnceLock::new();
    CONTEXT.get_or_init(Secp256k1::new)
}

/// SHA256
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Double SHA256
pub fn sha256d(data: &[u8]) -> Hash {
    Sha256::digest(Sha256::digest(data)).into()
}

/// SHA1
pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

/// RIPEMD160
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// HASH160: RIPEMD160 of SHA256
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// BIP340 tagged hash: SHA256(SHA256(tag) || SHA256(tag) || data).
///
/// The tag digest pair is what domain-separates every taproot commitment.
pub fn tagged_hash(tag: &str, data: &[u8]) -> Hash {
    let tag_digest = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_digest);
    hasher.update(tag_digest);
    hasher.update(data);
    hasher.finalize().into()
}

/// Incremental form of [`tagged_hash`] for multi-part messages.
pub struct TaggedHasher {
    inner: Sha256,
}

impl TaggedHasher {
    pub fn new(tag: &str) -> Self {
        let tag_digest = Sha256::digest(tag.as_bytes());
        let mut inner = Sha256::new();
        inner.update(tag_digest);
        inner.update(tag_digest);
        TaggedHasher { inner }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    pub fn finalize(self) -> Hash {
        self.inner.finalize().into()
    }
}

/// Strict DER check (BIP66) over a script signature, which carries a
/// trailing sighash-type byte after the DER body.
///
/// An empty signature is valid here: it is the canonical way to make a
/// signature check push false.
pub fn is_valid_signature_encoding(sig: &[u8]) -> bool {
    if sig.is_empty() {
        return true;
    }
    // Shortest possible DER signature plus sighash byte is 9 bytes; longest
    // is 72 DER bytes plus the sighash byte.
    if sig.len() < 9 || sig.len() > 73 {
        return false;
    }
    if sig[0] != 0x30 {
        return false;
    }
    // Declared length covers everything but the SEQUENCE header and the
    // sighash byte.
    if sig[1] as usize != sig.len() - 3 {
        return false;
    }

    let len_r = sig[3] as usize;
    if 5 + len_r >= sig.len() {
        return false;
    }
    let len_s = sig[5 + len_r] as usize;
    if len_r + len_s + 7 != sig.len() {
        return false;
    }

    if sig[2] != 0x02 || len_r == 0 {
        return false;
    }
    if sig[4] & 0x80 != 0 {
        return false;
    }
    // No unnecessary leading zero on R
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    if sig[4 + len_r] != 0x02 || len_s == 0 {
        return false;
    }
    if sig[6 + len_r] & 0x80 != 0 {
        return false;
    }
    // No unnecessary leading zero on S
    if len_s > 1 && sig[6 + len_r] == 0x00 && sig[7 + len_r] & 0x80 == 0 {
        return false;
    }

    true
}

/// Half of the curve order; an S value above this is malleable (BIP62).
const HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b,
    0x20, 0xa0,
];

/// Low-S check over a script signature (DER body plus sighash byte).
pub fn is_low_s_signature(sig: &[u8]) -> bool {
    if sig.is_empty() {
        return true;
    }
    let Ok(parsed) = EcdsaSignature::from_der_lax(&sig[..sig.len() - 1]) else {
        return false;
    };
    let compact = parsed.serialize_compact();
    compact[32..64] <= HALF_ORDER[..]
}

/// Verify an ECDSA signature (DER, without the sighash byte) over a digest.
///
/// Mirrors the deployed behavior: undecodable signatures and keys verify as
/// false rather than erroring, and a high-S signature that survived the
/// policy checks is normalized before verification.
pub fn verify_ecdsa_signature(sig_der: &[u8], pubkey: &[u8], digest: &Hash) -> bool {
    let Ok(pk) = PublicKey::from_slice(pubkey) else {
        return false;
    };
    let Ok(mut signature) = EcdsaSignature::from_der_lax(sig_der) else {
        return false;
    };
    signature.normalize_s();
    let Ok(message) = Message::from_digest_slice(digest) else {
        return false;
    };
    secp().verify_ecdsa(&message, &signature, &pk).is_ok()
}

/// Produce a DER-encoded ECDSA signature over a digest.
pub fn sign_ecdsa(digest: &Hash, secret_key: &SecretKey) -> Vec<u8> {
    let message = Message::from_digest_slice(digest).expect("digest is 32 bytes");
    secp()
        .sign_ecdsa(&message, secret_key)
        .serialize_der()
        .to_vec()
}

/// Verify a BIP340 Schnorr signature over a digest with an x-only key.
pub fn verify_schnorr_signature(sig: &[u8; 64], pubkey_x: &[u8; 32], digest: &Hash) -> bool {
    let Ok(pk) = XOnlyPublicKey::from_slice(pubkey_x) else {
        return false;
    };
    let signature = SchnorrSignature::from_slice(sig).expect("64 bytes is always a valid length");
    let Ok(message) = Message::from_digest_slice(digest) else {
        return false;
    };
    secp().verify_schnorr(&signature, &message, &pk).is_ok()
}

/// Produce a BIP340 Schnorr signature over a digest.
pub fn sign_schnorr(digest: &Hash, keypair: &Keypair) -> [u8; 64] {
    let message = Message::from_digest_slice(digest).expect("digest is 32 bytes");
    secp().sign_schnorr_no_aux_rand(&message, keypair).serialize()
}

/// Taproot output-key derivation: tweak an x-only internal key by the
/// commitment to an optional script tree (BIP341).
///
/// Returns the tweaked x-only key and its parity.
pub fn tweak_x_only_key(
    internal_key: &[u8; 32],
    merkle_root: Option<&Hash>,
) -> Result<([u8; 32], Parity), ScriptError> {
    let internal =
        XOnlyPublicKey::from_slice(internal_key).map_err(|_| ScriptError::InvalidPublicKey)?;
    let tweak = tap_tweak_scalar(internal_key, merkle_root)?;
    let full = PublicKey::from_x_only_public_key(internal, Parity::Even);
    let tweaked = full
        .add_exp_tweak(secp(), &tweak)
        .map_err(|_| ScriptError::InvalidPublicKey)?;
    let (xonly, parity) = tweaked.x_only_public_key();
    Ok((xonly.serialize(), parity))
}

/// Taproot key-path signing key: apply the output-key tweak to a keypair.
pub fn tweak_keypair(
    keypair: &Keypair,
    merkle_root: Option<&Hash>,
) -> Result<Keypair, ScriptError> {
    let (internal, _) = keypair.x_only_public_key();
    let tweak = tap_tweak_scalar(&internal.serialize(), merkle_root)?;
    keypair
        .add_xonly_tweak(secp(), &tweak)
        .map_err(|_| ScriptError::InvalidPublicKey)
}

fn tap_tweak_scalar(
    internal_key: &[u8; 32],
    merkle_root: Option<&Hash>,
) -> Result<Scalar, ScriptError> {
    let mut hasher = TaggedHasher::new("TapTweak");
    hasher.update(internal_key);
    if let Some(root) = merkle_root {
        hasher.update(root);
    }
    Scalar::from_be_bytes(hasher.finalize()).map_err(|_| ScriptError::InvalidPublicKey)
}
