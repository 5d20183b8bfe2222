//! Packing of an [`ExecutionContext`] for delayed and remote submission.
//!
//! The submission collaborator treats a packed request as opaque bytes and
//! hands it back unchanged when the request runs, possibly in another
//! process. The header carries enough to reject a damaged or foreign request
//! before decoding it.
//!
//! ## Layout
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic bytes: b"RXRQ"
//! 4       2     Layout version (u16, little-endian)
//! 6       2     Pending delayed requests (u16, little-endian)
//! 8       4     Parameter count (u32, little-endian)
//! 12      4     Error entry count (u32, little-endian)
//! 16      4     Payload length in bytes (u32, little-endian)
//! 20      16    Request digest: BLAKE3 in derive-key mode, first 16 bytes
//! 36..    var   Bincode-encoded context
//! ```
//!
//! The layout version must match exactly. The counts are checked against the
//! decoded context, so a payload that decodes but describes a different
//! request is still rejected.

use thiserror::Error;

use crate::types::ExecutionContext;

const MAGIC: &[u8; 4] = b"RXRQ";
const LAYOUT_VERSION: u16 = 1;
const HEADER_LEN: usize = 36;
const DIGEST_CONTEXT: &str = "rexec 2024-06 packed execution context";

/// Errors that can occur when packing an [`ExecutionContext`].
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("cannot encode context: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("context does not fit a packed request: {what} is {count}")]
    TooLarge { what: &'static str, count: usize },
}

/// Errors that can occur when unpacking a request.
#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("bytes are not a packed request")]
    BadMagic,

    #[error("request uses layout v{blob}, this engine reads v{supported}")]
    IncompatibleVersion { blob: u16, supported: u16 },

    #[error("request digest does not match its payload")]
    ChecksumMismatch,

    #[error("request declares {expected} bytes, {actual} present")]
    LengthMismatch { expected: u32, actual: usize },

    #[error("cannot decode context: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("request header disagrees with its context: {0}")]
    Validation(String),
}

/// Fixed-size prefix of a packed request.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Header {
    version: u16,
    delays: u16,
    params: u32,
    errors: u32,
    payload_len: u32,
    digest: [u8; 16],
}

impl Header {
    fn describe(ctx: &ExecutionContext, payload: &[u8]) -> Result<Self, SerializeError> {
        let narrow = |what, count: usize| SerializeError::TooLarge { what, count };
        Ok(Self {
            version: LAYOUT_VERSION,
            delays: u16::try_from(ctx.delay_stack.len())
                .map_err(|_| narrow("pending delay count", ctx.delay_stack.len()))?,
            params: u32::try_from(ctx.params.len())
                .map_err(|_| narrow("parameter count", ctx.params.len()))?,
            errors: u32::try_from(ctx.errors.len())
                .map_err(|_| narrow("error entry count", ctx.errors.len()))?,
            payload_len: u32::try_from(payload.len())
                .map_err(|_| narrow("payload length", payload.len()))?,
            digest: digest(payload),
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.delays.to_le_bytes());
        out.extend_from_slice(&self.params.to_le_bytes());
        out.extend_from_slice(&self.errors.to_le_bytes());
        out.extend_from_slice(&self.payload_len.to_le_bytes());
        out.extend_from_slice(&self.digest);
    }

    fn read(bytes: &[u8]) -> Result<Self, DeserializeError> {
        let Some(head) = bytes.get(..HEADER_LEN) else {
            return Err(DeserializeError::LengthMismatch {
                expected: HEADER_LEN as u32,
                actual: bytes.len(),
            });
        };
        if &head[0..4] != MAGIC {
            return Err(DeserializeError::BadMagic);
        }
        let u16_at = |at: usize| u16::from_le_bytes([head[at], head[at + 1]]);
        let u32_at =
            |at: usize| u32::from_le_bytes([head[at], head[at + 1], head[at + 2], head[at + 3]]);
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&head[20..36]);
        Ok(Self {
            version: u16_at(4),
            delays: u16_at(6),
            params: u32_at(8),
            errors: u32_at(12),
            payload_len: u32_at(16),
            digest,
        })
    }

    fn check(&self, ctx: &ExecutionContext) -> Result<(), DeserializeError> {
        let counts = [
            ("pending delays", self.delays as usize, ctx.delay_stack.len()),
            ("parameters", self.params as usize, ctx.params.len()),
            ("error entries", self.errors as usize, ctx.errors.len()),
        ];
        for (what, declared, found) in counts {
            if declared != found {
                return Err(DeserializeError::Validation(format!(
                    "{declared} {what} declared, {found} found"
                )));
            }
        }
        if let Some(name) = ctx.params.duplicate_name() {
            return Err(DeserializeError::Validation(format!(
                "parameter '{name}' appears more than once"
            )));
        }
        Ok(())
    }
}

fn digest(payload: &[u8]) -> [u8; 16] {
    let mut hasher = blake3::Hasher::new_derive_key(DIGEST_CONTEXT);
    hasher.update(payload);
    let mut out = [0u8; 16];
    out.copy_from_slice(&hasher.finalize().as_bytes()[..16]);
    out
}

/// Pack `ctx` into a self-checking byte string.
///
/// # Errors
///
/// Returns [`SerializeError`] if encoding fails or a count overflows its
/// header field.
pub fn pack(ctx: &ExecutionContext) -> Result<Vec<u8>, SerializeError> {
    let payload = bincode::serde::encode_to_vec(ctx, bincode::config::standard())?;
    let header = Header::describe(ctx, &payload)?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    header.write(&mut out);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Unpack a request produced by [`pack`].
///
/// # Errors
///
/// Returns [`DeserializeError`] if the header is foreign or from another
/// layout version, the payload is short or altered, or the decoded context
/// does not match the header.
pub fn unpack(bytes: &[u8]) -> Result<ExecutionContext, DeserializeError> {
    let header = Header::read(bytes)?;
    if header.version != LAYOUT_VERSION {
        return Err(DeserializeError::IncompatibleVersion {
            blob: header.version,
            supported: LAYOUT_VERSION,
        });
    }

    let body = &bytes[HEADER_LEN..];
    let Some(payload) = body.get(..header.payload_len as usize) else {
        return Err(DeserializeError::LengthMismatch {
            expected: header.payload_len,
            actual: body.len(),
        });
    };
    if digest(payload) != header.digest {
        return Err(DeserializeError::ChecksumMismatch);
    }

    let (ctx, _): (ExecutionContext, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
    header.check(&ctx)?;
    Ok(ctx)
}

#[cfg(test)]
mod tests {
    use serde::Serialize;

    use super::*;
    use crate::types::{ParamArray, ParamValue, Parameter, RuleError, SessionRecord, Table};

    fn sample() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            SessionRecord::new()
                .set("client.user", "rods")
                .set("data.size", 1024_i64),
        )
        .with_params(
            ParamArray::new()
                .with("*Path", "/tempZone/home/rods/a.txt")
                .with("*Count", 3_i64)
                .with("*Ids", vec![1_i64, 2])
                .with(
                    "*Rows",
                    Table::new(vec!["name".into()]).with_row(vec!["a".into()]),
                ),
        );
        ctx.push_error(&RuleError::FailAction, "acTest");
        ctx.delay_stack.push(7);
        ctx
    }

    #[test]
    fn pack_unpack_preserves_context() {
        let ctx = sample();
        let bytes = pack(&ctx).unwrap();
        assert_eq!(&bytes[0..4], MAGIC);
        assert_eq!(unpack(&bytes).unwrap(), ctx);
    }

    #[test]
    fn header_records_counts() {
        let bytes = pack(&sample()).unwrap();
        let header = Header::read(&bytes).unwrap();
        assert_eq!(header.version, LAYOUT_VERSION);
        assert_eq!(header.delays, 1);
        assert_eq!(header.params, 4);
        assert_eq!(header.errors, 1);
        assert_eq!(header.payload_len as usize, bytes.len() - HEADER_LEN);

        let mut rewritten = Vec::new();
        header.write(&mut rewritten);
        assert_eq!(rewritten, bytes[..HEADER_LEN]);
    }

    #[test]
    fn digest_is_domain_separated() {
        assert_ne!(digest(b"request"), blake3::hash(b"request").as_bytes()[..16]);
    }

    #[test]
    fn foreign_bytes_rejected() {
        let mut bytes = pack(&sample()).unwrap();
        bytes[0..4].copy_from_slice(b"BAAD");
        assert!(matches!(unpack(&bytes), Err(DeserializeError::BadMagic)));
        assert!(matches!(
            unpack(&[0u8; 10]),
            Err(DeserializeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn altered_payload_rejected() {
        let mut bytes = pack(&sample()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(
            unpack(&bytes),
            Err(DeserializeError::ChecksumMismatch)
        ));
    }

    #[test]
    fn other_layout_version_rejected() {
        let mut bytes = pack(&sample()).unwrap();
        bytes[4..6].copy_from_slice(&2u16.to_le_bytes());
        assert!(matches!(
            unpack(&bytes),
            Err(DeserializeError::IncompatibleVersion {
                blob: 2,
                supported: 1
            })
        ));
    }

    #[test]
    fn short_payload_rejected() {
        let bytes = pack(&sample()).unwrap();
        assert!(matches!(
            unpack(&bytes[..bytes.len() - 3]),
            Err(DeserializeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn miscounted_header_rejected() {
        let mut bytes = pack(&sample()).unwrap();
        bytes[8..12].copy_from_slice(&9u32.to_le_bytes());
        assert!(matches!(
            unpack(&bytes),
            Err(DeserializeError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_parameter_rejected() {
        // Same serde shape as `ParamArray`, without its uniqueness guarantee.
        #[derive(Serialize)]
        struct RawParams {
            params: Vec<Parameter>,
        }
        let raw = RawParams {
            params: vec![Parameter::new("*A", "1"), Parameter::new("*A", ParamValue::Int(2))],
        };
        let encoded = bincode::serde::encode_to_vec(&raw, bincode::config::standard()).unwrap();
        let (params, _): (ParamArray, usize) =
            bincode::serde::decode_from_slice(&encoded, bincode::config::standard()).unwrap();

        let ctx = ExecutionContext::default().with_params(params);
        let header = Header {
            version: LAYOUT_VERSION,
            delays: 0,
            params: 2,
            errors: 0,
            payload_len: 0,
            digest: [0; 16],
        };
        assert!(matches!(
            header.check(&ctx),
            Err(DeserializeError::Validation(_))
        ));
    }
}
