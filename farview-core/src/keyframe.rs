//! Keyframe cache for mid-stream joiners.
//!
//! An inter-frame codec is undecodable from an arbitrary point; a new
//! subscriber needs the most recent SPS+PPS+IDR sequence before the
//! live stream makes sense. The cache keeps exactly that: the payload
//! of the last keyframe packet, with an access unit delimiter prepended
//! when the encoder did not emit one (some decoders refuse to lock
//! onto a stream that does not start with an AUD).
//!
//! For intra-only codecs every packet is a keyframe and the cache
//! degenerates to "the last packet", with the same code path.

use crate::encoder::EncodedPacket;
use crate::nal;

/// Most recent self-decodable payload, if any.
#[derive(Debug, Default, Clone)]
pub struct KeyframeCache {
    cached: Option<Vec<u8>>,
}

impl KeyframeCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `packet` if it is a keyframe; non-keyframes are ignored.
    ///
    /// H.264 payloads lacking an AUD get [`nal::AUD_PREFIX`] prepended
    /// so the cached bytes always begin a well-formed access unit.
    pub fn update(&mut self, packet: &EncodedPacket) {
        if !packet.is_keyframe {
            return;
        }

        let bytes = if packet.codec == crate::encoder::Codec::H264
            && !nal::contains_aud(&packet.data)
        {
            let mut prefixed = Vec::with_capacity(nal::AUD_PREFIX.len() + packet.data.len());
            prefixed.extend_from_slice(&nal::AUD_PREFIX);
            prefixed.extend_from_slice(&packet.data);
            prefixed
        } else {
            packet.data.clone()
        };

        self.cached = Some(bytes);
    }

    /// The cached payload, cloned for delivery to one subscriber.
    pub fn get(&self) -> Option<Vec<u8>> {
        self.cached.clone()
    }

    /// Whether a keyframe has been observed since the last clear.
    pub fn is_empty(&self) -> bool {
        self.cached.is_none()
    }

    /// Drop the cached payload (pipeline stop).
    pub fn clear(&mut self) {
        self.cached = None;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Codec;

    fn h264_packet(headers: &[u8], keyframe: bool) -> EncodedPacket {
        let mut data = Vec::new();
        for &h in headers {
            data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, h, 0xAA]);
        }
        EncodedPacket {
            codec: Codec::H264,
            is_keyframe: keyframe,
            sequence: 1,
            data,
        }
    }

    #[test]
    fn non_keyframes_ignored() {
        let mut cache = KeyframeCache::new();
        cache.update(&h264_packet(&[0x41], false));
        assert!(cache.is_empty());
        assert!(cache.get().is_none());
    }

    #[test]
    fn keyframe_without_aud_gets_prefix() {
        let mut cache = KeyframeCache::new();
        let pkt = h264_packet(&[0x67, 0x68, 0x65], true);
        cache.update(&pkt);

        let cached = cache.get().unwrap();
        assert_eq!(&cached[..6], &nal::AUD_PREFIX);
        assert_eq!(&cached[6..], &pkt.data[..]);
        assert!(nal::contains_aud(&cached));
        assert!(nal::contains_idr(&cached));
    }

    #[test]
    fn keyframe_with_aud_kept_verbatim() {
        let mut cache = KeyframeCache::new();
        let pkt = h264_packet(&[0x09, 0x67, 0x68, 0x65], true);
        cache.update(&pkt);
        assert_eq!(cache.get().unwrap(), pkt.data);
    }

    #[test]
    fn newer_keyframe_replaces_older() {
        let mut cache = KeyframeCache::new();
        cache.update(&h264_packet(&[0x09, 0x65], true));
        let newer = h264_packet(&[0x09, 0x67, 0x68, 0x65], true);
        cache.update(&newer);
        assert_eq!(cache.get().unwrap(), newer.data);
    }

    #[test]
    fn jpeg_packets_cache_as_is() {
        let mut cache = KeyframeCache::new();
        let pkt = EncodedPacket {
            codec: Codec::Jpeg,
            is_keyframe: true,
            sequence: 3,
            data: vec![0xFF, 0xD8, 0xFF, 0xE0],
        };
        cache.update(&pkt);
        // No AUD games for intra-only codecs.
        assert_eq!(cache.get().unwrap(), pkt.data);
    }

    #[test]
    fn clear_empties_cache() {
        let mut cache = KeyframeCache::new();
        cache.update(&h264_packet(&[0x09, 0x65], true));
        cache.clear();
        assert!(cache.is_empty());
    }
}
