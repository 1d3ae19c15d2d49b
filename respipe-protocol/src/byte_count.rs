//! UTF-8 length of UTF-16 text, computed without transcoding.

const HIGH_SURROGATE_START: u16 = 0xD800;
const LOW_SURROGATE_START: u16 = 0xDC00;
const LOW_SURROGATE_END: u16 = 0xDFFF;

/// Returns the number of bytes the UTF-8 encoding of `units` would occupy.
///
/// The scan runs from the end. Every code unit starts at one byte; units
/// above `0x7F` add one byte and units above `0x7FF` add two. A low surrogate
/// skips its paired high surrogate, since the pair is a single 4-byte code
/// point and the low half already accounts for 1 + 2 bytes of it.
///
/// Lone surrogates count as 3 bytes, the size of U+FFFD, which is what they
/// are replaced with on encoding.
pub fn utf8_len(units: &[u16]) -> usize {
    let mut len = units.len();
    let mut i = units.len();

    while i > 0 {
        i -= 1;
        let unit = units[i];

        if unit <= 0x7F {
            continue;
        }

        if unit <= 0x7FF {
            len += 1;
            continue;
        }

        len += 2;

        if (LOW_SURROGATE_START..=LOW_SURROGATE_END).contains(&unit)
            && i > 0
            && (HIGH_SURROGATE_START..LOW_SURROGATE_START).contains(&units[i - 1])
        {
            i -= 1;
        }
    }

    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn wide(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    #[test]
    fn test_ascii() {
        assert_eq!(utf8_len(&wide("")), 0);
        assert_eq!(utf8_len(&wide("PING")), 4);
    }

    #[test]
    fn test_two_and_three_byte_code_points() {
        assert_eq!(utf8_len(&wide("é")), 2);
        assert_eq!(utf8_len(&wide("€")), 3);
        assert_eq!(utf8_len(&wide("a€é")), 6);
    }

    #[test]
    fn test_surrogate_pair() {
        assert_eq!(utf8_len(&wide("😉")), 4);
        assert_eq!(utf8_len(&wide("> test 😉 !")), "> test 😉 !".len());
    }

    #[test]
    fn test_lone_surrogates_count_as_replacement_char() {
        assert_eq!(utf8_len(&[0xD800]), 3);
        assert_eq!(utf8_len(&[0xDC00]), 3);
        assert_eq!(utf8_len(&[0x61, 0xDFFF, 0x62]), 5);

        let replaced: String = char::decode_utf16([0xDC00u16, 0xD800])
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        assert_eq!(utf8_len(&[0xDC00, 0xD800]), replaced.len());
    }

    proptest! {
        #[test]
        fn test_matches_encoded_length(s in "\\PC*") {
            prop_assert_eq!(utf8_len(&wide(&s)), s.len());
        }

        #[test]
        fn test_matches_lossy_encoding(units in proptest::collection::vec(any::<u16>(), 0..64)) {
            let encoded: String = char::decode_utf16(units.iter().copied())
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect();
            prop_assert_eq!(utf8_len(&units), encoded.len());
        }
    }
}
