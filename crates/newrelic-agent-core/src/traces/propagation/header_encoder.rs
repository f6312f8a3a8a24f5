//! Base64 framing of the `newrelic` header value.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::traces::propagation::error::PayloadError;
use crate::traces::propagation::payload::DistributedTracePayload;

/// Standard alphabet, padded on encode. Some upstream agents strip the padding.
const HEADER_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[must_use]
pub fn encode_base64(text: &str) -> String {
    HEADER_ENGINE.encode(text)
}

pub fn try_decode_base64_to_string(encoded: &str) -> Result<String, PayloadError> {
    let bytes = HEADER_ENGINE.decode(encoded.trim())?;
    Ok(String::from_utf8(bytes)?)
}

/// Single-line header value for `payload`.
pub fn serialize_and_encode_distributed_trace_payload(
    payload: &DistributedTracePayload,
) -> Result<String, PayloadError> {
    Ok(encode_base64(&payload.to_json()?))
}

/// Decodes a header value back into a validated payload.
///
/// Besides base64, raw JSON text is accepted, as sent by some message-broker
/// instrumentation.
pub fn try_decode_and_deserialize_distributed_trace_payload(
    encoded: &str,
) -> Result<DistributedTracePayload, PayloadError> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(PayloadError::Null);
    }
    if trimmed.starts_with('{') {
        return DistributedTracePayload::try_build_incoming_payload_from_json(trimmed);
    }

    let json = try_decode_base64_to_string(trimmed)?;
    DistributedTracePayload::try_build_incoming_payload_from_json(&json)
}
