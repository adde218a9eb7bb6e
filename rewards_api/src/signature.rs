//! Personal-message signatures for claims
//!
//! Claims are authenticated by an EIP-191 `personal_sign` over a fixed text
//! template. The signer address is recovered from the 65-byte signature and
//! compared with the claimed address.

use keccak_hash::keccak;
use once_cell::sync::Lazy;
use regex::Regex;
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, Secp256k1,
};
use thiserror::Error;

static ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("static regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature is not valid hex: {0}")]
    Malformed(String),

    #[error("signature must be 65 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid recovery id {0}")]
    InvalidRecoveryId(u8),

    #[error("public key recovery failed")]
    RecoveryFailed,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FreshnessError {
    #[error("signature expired")]
    Expired { age_ms: i64 },

    #[error("signature issued in the future")]
    FromFuture { ahead_ms: i64 },
}

/// Lowercase a `0x`-prefixed 20-byte hex address, or `None` if malformed
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if ADDRESS_RE.is_match(trimmed) {
        Some(trimmed.to_lowercase())
    } else {
        None
    }
}

/// Text signed for a whitelist rewards claim
pub fn whitelist_claim_message(season_id: &str, address: &str, issued_at_ms: i64) -> String {
    format!(
        "CurrentX Whitelist Rewards Claim\nSeason: {}\nAddress: {}\nIssuedAt: {}\nAction: claim",
        season_id,
        address.to_lowercase(),
        issued_at_ms
    )
}

/// Text signed for a points leaderboard claim
pub fn points_claim_message(season_id: &str, address: &str, issued_at_ms: i64) -> String {
    format!(
        "CurrentX Points Rewards Claim\nProgram: points-leaderboard\nSeason: {}\nAddress: {}\nIssuedAt: {}\nAction: claim-points",
        season_id,
        address.to_lowercase(),
        issued_at_ms
    )
}

/// keccak256("\x19Ethereum Signed Message:\n" + len + message)
pub fn personal_message_hash(message: &str) -> [u8; 32] {
    let mut payload = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    payload.extend_from_slice(message.as_bytes());
    keccak(&payload).to_fixed_bytes()
}

/// Lowercase 0x address of an uncompressed public key
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak(&uncompressed[1..]);
    format!("0x{}", hex::encode(&hash.as_bytes()[12..]))
}

/// Recover the address that produced `signature_hex` over `message`
pub fn recover_personal_signer(message: &str, signature_hex: &str) -> Result<String, SignatureError> {
    let trimmed = signature_hex.trim();
    let bytes = hex::decode(trimmed.strip_prefix("0x").unwrap_or(trimmed))
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    if bytes.len() != 65 {
        return Err(SignatureError::InvalidLength(bytes.len()));
    }

    let v = bytes[64];
    let recovery = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };
    let recovery_id =
        RecoveryId::from_i32(i32::from(recovery)).map_err(|_| SignatureError::InvalidRecoveryId(v))?;
    let signature = RecoverableSignature::from_compact(&bytes[..64], recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    let digest = personal_message_hash(message);
    let msg = Message::from_slice(&digest).map_err(|_| SignatureError::RecoveryFailed)?;
    let secp = Secp256k1::verification_only();
    let public_key = secp
        .recover_ecdsa(&msg, &signature)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(address_from_public_key(&public_key))
}

/// Replay window: at most `ttl_seconds` old, at most `max_future_skew_seconds` ahead
pub fn check_freshness(
    issued_at_ms: i64,
    now_ms: i64,
    ttl_seconds: u64,
    max_future_skew_seconds: u64,
) -> Result<(), FreshnessError> {
    let ahead_ms = issued_at_ms.saturating_sub(now_ms);
    if ahead_ms > (max_future_skew_seconds as i64).saturating_mul(1000) {
        return Err(FreshnessError::FromFuture { ahead_ms });
    }
    let age_ms = now_ms.saturating_sub(issued_at_ms);
    if age_ms > (ttl_seconds as i64).saturating_mul(1000) {
        return Err(FreshnessError::Expired { age_ms });
    }
    Ok(())
}
