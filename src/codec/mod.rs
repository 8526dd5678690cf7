use crate::models::BallotPayload;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("payload is not a valid ballot: {0}")]
    Json(#[from] serde_json::Error),
}

/// Boundary between ballot contents and what the store keeps. Swapping the
/// implementation must not touch validation or tallying.
pub trait BallotCodec: Send + Sync {
    fn encode(&self, payload: &BallotPayload) -> Result<String, CodecError>;
    fn decode(&self, opaque: &str) -> Result<BallotPayload, CodecError>;
}

/// Hex-wrapped JSON. Reversible by anyone: an integrity placeholder,
/// not confidentiality.
#[derive(Debug, Default, Clone, Copy)]
pub struct HexJsonCodec;

impl BallotCodec for HexJsonCodec {
    fn encode(&self, payload: &BallotPayload) -> Result<String, CodecError> {
        let json = serde_json::to_vec(payload)?;
        Ok(hex::encode(json))
    }

    fn decode(&self, opaque: &str) -> Result<BallotPayload, CodecError> {
        let bytes = hex::decode(opaque)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
