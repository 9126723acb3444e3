//! Annex-B NAL unit scanning for H.264 elementary streams.
//!
//! Used by the keyframe cache to decide whether a packet is
//! self-decodable and by the periodic stream diagnostics. Only the
//! 4-byte start code `00 00 00 01` is searched for, matching what the
//! encoder emits.

/// NAL unit types relevant to the pipeline.
pub const NAL_SLICE: u8 = 1;
pub const NAL_IDR: u8 = 5;
pub const NAL_SPS: u8 = 7;
pub const NAL_PPS: u8 = 8;
pub const NAL_AUD: u8 = 9;

/// Access unit delimiter with primary_pic_type = 0, prepended to cached
/// keyframes whose encoder did not emit one.
pub const AUD_PREFIX: [u8; 6] = [0x00, 0x00, 0x00, 0x01, 0x09, 0x10];

/// A NAL unit located in an Annex-B stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalUnit {
    /// Low 5 bits of the NAL header byte.
    pub nal_type: u8,
    /// Byte offset of the start code.
    pub position: usize,
}

/// Scan `payload` for 4-byte start codes and return every NAL unit.
pub fn scan(payload: &[u8]) -> Vec<NalUnit> {
    let mut units = Vec::new();
    if payload.len() < 5 {
        return units;
    }

    for i in 0..payload.len() - 4 {
        if payload[i] == 0x00
            && payload[i + 1] == 0x00
            && payload[i + 2] == 0x00
            && payload[i + 3] == 0x01
        {
            units.push(NalUnit {
                nal_type: payload[i + 4] & 0x1F,
                position: i,
            });
        }
    }

    units
}

/// A packet is a keyframe iff it contains an IDR slice. SPS+PPS alone
/// are not enough for a fresh decoder to start producing pictures.
pub fn contains_idr(payload: &[u8]) -> bool {
    scan(payload).iter().any(|n| n.nal_type == NAL_IDR)
}

/// Whether the payload already carries an access unit delimiter.
pub fn contains_aud(payload: &[u8]) -> bool {
    scan(payload).iter().any(|n| n.nal_type == NAL_AUD)
}

/// Human-readable summary of the NAL types in a payload, for the
/// throttled stream diagnostics.
pub fn describe(payload: &[u8]) -> String {
    let names: Vec<String> = scan(payload)
        .iter()
        .map(|n| match n.nal_type {
            NAL_SLICE => "P".to_string(),
            NAL_IDR => "IDR".to_string(),
            NAL_SPS => "SPS".to_string(),
            NAL_PPS => "PPS".to_string(),
            NAL_AUD => "AUD".to_string(),
            t => format!("NAL{t}"),
        })
        .collect();
    names.join("+")
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a payload of start-code-delimited units with the given
    /// NAL header bytes.
    fn stream(headers: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for &h in headers {
            out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, h, 0xAA, 0xBB]);
        }
        out
    }

    #[test]
    fn scan_finds_all_units() {
        let payload = stream(&[0x67, 0x68, 0x65]); // SPS, PPS, IDR
        let units = scan(&payload);
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].nal_type, NAL_SPS);
        assert_eq!(units[1].nal_type, NAL_PPS);
        assert_eq!(units[2].nal_type, NAL_IDR);
    }

    #[test]
    fn idr_required_for_keyframe() {
        assert!(contains_idr(&stream(&[0x67, 0x68, 0x65])));
        // Parameter sets alone are not a keyframe.
        assert!(!contains_idr(&stream(&[0x67, 0x68])));
        // A plain P slice is not a keyframe.
        assert!(!contains_idr(&stream(&[0x41])));
    }

    #[test]
    fn aud_detection() {
        assert!(contains_aud(&stream(&[0x09, 0x65])));
        assert!(!contains_aud(&stream(&[0x67, 0x65])));
        let mut with_prefix = AUD_PREFIX.to_vec();
        with_prefix.extend_from_slice(&stream(&[0x65]));
        assert!(contains_aud(&with_prefix));
    }

    #[test]
    fn short_payload_is_empty() {
        assert!(scan(&[0x00, 0x00, 0x00, 0x01]).is_empty());
        assert!(!contains_idr(&[]));
    }

    #[test]
    fn describe_names_units() {
        let payload = stream(&[0x67, 0x68, 0x65, 0x41]);
        assert_eq!(describe(&payload), "SPS+PPS+IDR+P");
    }
}
