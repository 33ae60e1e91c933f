//! Decoder for the kernel's hexadecimal socket address encoding.
//!
//! Connection-table rows carry each endpoint as `HEXIP:HEXPORT`, where the
//! IP bytes appear in host-native little-endian order. Decoding reverses the
//! byte order to recover the conventional big-endian dotted-decimal form,
//! and parses the port as base-16.

use std::net::Ipv4Addr;

use thiserror::Error;

/// A malformed endpoint field. Callers skip the offending row; a bad row
/// never aborts the table read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The field did not split into exactly an address and a port.
    #[error("invalid endpoint format: {0:?}")]
    MalformedEndpoint(String),

    /// Non-hex digits where hex was expected.
    #[error("invalid hex digits: {0:?}")]
    InvalidHex(String),

    /// 16-byte addresses are the IPv6 form, which is not decoded here.
    #[error("IPv6 addresses are not supported")]
    Ipv6Unsupported,

    /// The address portion decoded to something other than 4 bytes.
    #[error("invalid IP address length: {0} bytes")]
    InvalidLength(usize),
}

/// Decode a `HEXIP:HEXPORT` endpoint into a dotted-decimal address and a
/// decimal port string.
///
/// # Errors
///
/// Returns [`DecodeError`] if the field does not split on a single `:`,
/// contains non-hex digits, or the address is not the 4-byte IPv4 form.
pub fn decode_endpoint(raw: &str) -> Result<(String, String), DecodeError> {
    let (ip_hex, port_hex) = raw
        .split_once(':')
        .ok_or_else(|| DecodeError::MalformedEndpoint(raw.to_owned()))?;
    if port_hex.contains(':') {
        return Err(DecodeError::MalformedEndpoint(raw.to_owned()));
    }

    let ip = decode_ip(ip_hex)?;
    let port = u16::from_str_radix(port_hex, 16)
        .map_err(|_| DecodeError::InvalidHex(port_hex.to_owned()))?;

    Ok((ip.to_string(), port.to_string()))
}

/// Decode the 8-hex-digit address portion, reversing byte order from the
/// kernel's little-endian representation.
fn decode_ip(hex: &str) -> Result<Ipv4Addr, DecodeError> {
    match hex.len() {
        8 => {
            let mut octets = [0u8; 4];
            for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
                let pair = std::str::from_utf8(chunk)
                    .map_err(|_| DecodeError::InvalidHex(hex.to_owned()))?;
                octets[i] = u8::from_str_radix(pair, 16)
                    .map_err(|_| DecodeError::InvalidHex(hex.to_owned()))?;
            }
            octets.reverse();
            Ok(Ipv4Addr::from(octets))
        }
        // 32 hex digits is the in-kernel IPv6 encoding.
        32 => Err(DecodeError::Ipv6Unsupported),
        n => Err(DecodeError::InvalidLength(n / 2)),
    }
}
