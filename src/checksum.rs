//! XOR-fold checksum shared by both framing layers.

/// XOR of every byte in `data`, identity 0 for an empty span.
///
/// Inbound command envelopes fold `[CMD, LEN, PAYLOAD...]`; outbound
/// response envelopes fold `[STATUS, CMD, LEN, PAYLOAD...]`.
#[must_use]
pub fn xor_fold(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_span_is_zero() {
        assert_eq!(xor_fold(&[]), 0);
    }

    #[test]
    fn test_single_byte_is_identity() {
        assert_eq!(xor_fold(&[0x5A]), 0x5A);
    }

    #[test]
    fn test_fold_is_order_independent() {
        assert_eq!(xor_fold(&[0x01, 0x02, 0x32, 0x00]), xor_fold(&[0x32, 0x02, 0x00, 0x01]));
    }

    #[test]
    fn test_known_command_fold() {
        // Get-info request: CMD=0x07, LEN=0x00 -> CHK=0x07
        assert_eq!(xor_fold(&[0x07, 0x00]), 0x07);
        // Set digital period to 50 ms: CMD=0x03, LEN=0x02, payload 32 00
        assert_eq!(xor_fold(&[0x03, 0x02, 0x32, 0x00]), 0x33);
    }

    #[test]
    fn test_fold_with_itself_cancels() {
        let data = [0xDE, 0xAD, 0xBE, 0xEF];
        let chk = xor_fold(&data);
        let mut tagged = data.to_vec();
        tagged.push(chk);
        assert_eq!(xor_fold(&tagged), 0);
    }
}
