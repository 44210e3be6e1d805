/// Number of 4-hex-digit segments in a generated identifier.
pub const ID_SEGMENTS: usize = 6;

/// Generate an opaque identifier for correlating requests and replies.
///
/// Six random 16-bit segments, zero-padded to four hex digits and joined by
/// `-` (e.g. `0a1f-93c2-0007-ffee-5b10-c4d2`). Unique enough for in-flight
/// correlation within one session; not suitable as a secret.
pub fn generate_id() -> String {
    let segments: Vec<String> = (0..ID_SEGMENTS)
        .map(|_| format!("{:04x}", rand::random::<u16>()))
        .collect();
    segments.join("-")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn shape_is_six_padded_hex_segments() {
        for _ in 0..256 {
            let id = generate_id();
            let segments: Vec<&str> = id.split('-').collect();
            assert_eq!(segments.len(), ID_SEGMENTS);
            for segment in segments {
                assert_eq!(segment.len(), 4, "segment {segment:?} in {id}");
                assert!(segment.chars().all(|c| c.is_ascii_hexdigit()));
            }
        }
    }

    #[test]
    fn consecutive_ids_differ() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
