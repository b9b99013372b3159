//! Codec identification from the SDP banner (RFC 8866, RFC 6184 §8).
//!
//! Only the lines that select a codec are read:
//!
//! ```text
//! m=video 0 RTP/AVP 96                          ← media payload types
//! a=rtpmap:96 H264/90000                        ← codec/clock rate
//! a=fmtp:96 packetization-mode=1;sprop-parameter-sets=Z0IAHg==,aM48gA==
//! ```
//!
//! Everything else in the banner is ignored. A banner with no usable
//! `a=rtpmap` falls back to H.264 on payload type 96, flagged
//! [`provisional`](CodecInfo::provisional).

use std::fmt;

use base64::prelude::{BASE64_STANDARD, Engine as _};

use crate::error::{BannerErrorKind, IngestError, Result};

pub const DEFAULT_PAYLOAD_TYPE: u8 = 96;
pub const DEFAULT_CLOCK_RATE: u32 = 90000;

/// Codec named by the banner's `a=rtpmap` encoding name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    H264,
    H265,
    /// Any other encoding name, upper-cased.
    Other(String),
}

impl Codec {
    fn from_encoding_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "H264" => Self::H264,
            "H265" | "HEVC" => Self::H265,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => write!(f, "H264"),
            Self::H265 => write!(f, "H265"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Result of codec identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    pub codec: Codec,
    pub payload_type: u8,
    pub clock_rate: u32,
    /// RFC 6184 `packetization-mode` (0 single NAL, 1 non-interleaved, 2 interleaved).
    pub packetization_mode: u8,
    /// Out-of-band SPS/PPS from `sprop-parameter-sets`, in banner order.
    pub parameter_sets: Vec<Vec<u8>>,
    /// Set when the banner did not name a codec and the default was assumed.
    pub provisional: bool,
}

impl CodecInfo {
    /// The fallback used when the banner names no codec.
    pub fn provisional_h264() -> Self {
        Self {
            codec: Codec::H264,
            payload_type: DEFAULT_PAYLOAD_TYPE,
            clock_rate: DEFAULT_CLOCK_RATE,
            packetization_mode: 0,
            parameter_sets: Vec::new(),
            provisional: true,
        }
    }
}

/// Identify the video codec announced by a raw banner frame.
///
/// Fails with [`BannerErrorKind::Malformed`] when the banner is not UTF-8
/// or contains nothing but whitespace.
pub fn identify_codec(banner: &[u8]) -> Result<CodecInfo> {
    let text = std::str::from_utf8(banner)
        .map_err(|_| IngestError::banner(BannerErrorKind::Malformed))?;
    if text.trim().is_empty() {
        return Err(IngestError::banner(BannerErrorKind::Malformed));
    }

    let video_types = video_payload_types(text);

    let Some((payload_type, name, clock_rate)) = text
        .lines()
        .filter_map(parse_rtpmap)
        .find(|(pt, _, _)| video_types.is_empty() || video_types.contains(pt))
    else {
        tracing::warn!("banner has no usable rtpmap, assuming H264/90000");
        return Ok(CodecInfo::provisional_h264());
    };

    let mut info = CodecInfo {
        codec: Codec::from_encoding_name(name),
        payload_type,
        clock_rate,
        packetization_mode: 0,
        parameter_sets: Vec::new(),
        provisional: false,
    };

    if let Some(params) = text.lines().find_map(|line| fmtp_params(line, payload_type)) {
        apply_fmtp(&mut info, params);
    }

    tracing::debug!(
        codec = %info.codec,
        pt = info.payload_type,
        clock_rate = info.clock_rate,
        packetization_mode = info.packetization_mode,
        parameter_sets = info.parameter_sets.len(),
        "codec identified"
    );

    Ok(info)
}

/// Payload types listed on `m=video` lines.
fn video_payload_types(text: &str) -> Vec<u8> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("m=video "))
        .flat_map(|media| media.split_whitespace().skip(2))
        .filter_map(|pt| pt.parse().ok())
        .collect()
}

/// `a=rtpmap:<pt> <name>/<rate>[/<params>]`
fn parse_rtpmap(line: &str) -> Option<(u8, &str, u32)> {
    let rest = line.trim().strip_prefix("a=rtpmap:")?;
    let (pt, encoding) = rest.split_once(char::is_whitespace)?;
    let pt: u8 = pt.trim().parse().ok()?;
    let mut parts = encoding.trim().split('/');
    let name = parts.next().filter(|n| !n.is_empty())?;
    let rate = parts
        .next()
        .and_then(|r| r.trim().parse().ok())
        .unwrap_or(DEFAULT_CLOCK_RATE);
    Some((pt, name, rate))
}

/// Parameter string of `a=fmtp:<pt> <params>` for the given payload type.
fn fmtp_params(line: &str, payload_type: u8) -> Option<&str> {
    let rest = line.trim().strip_prefix("a=fmtp:")?;
    let (pt, params) = rest.split_once(char::is_whitespace)?;
    (pt.trim().parse::<u8>().ok()? == payload_type).then_some(params)
}

fn apply_fmtp(info: &mut CodecInfo, params: &str) {
    for param in params.split(';') {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        match key.trim() {
            "packetization-mode" => {
                if let Ok(mode) = value.trim().parse() {
                    info.packetization_mode = mode;
                }
            }
            "sprop-parameter-sets" => {
                for encoded in value.trim().split(',').filter(|s| !s.is_empty()) {
                    match BASE64_STANDARD.decode(encoded) {
                        Ok(set) if !set.is_empty() => info.parameter_sets.push(set),
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(error = %e, "undecodable sprop-parameter-sets entry")
                        }
                    }
                }
            }
            _ => {}
        }
    }
}
