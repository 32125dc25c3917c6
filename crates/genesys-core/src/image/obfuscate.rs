//! Repeating-key XOR used for the scaler footer

/// Key applied to the scaler footer
pub const OBFUSCATION_KEY: &[u8] = b"mstar";

/// XOR `buf` in place with [`OBFUSCATION_KEY`], indexed from `buf[0]`
///
/// The operation is its own inverse.
pub fn xor_obfuscate(buf: &mut [u8]) {
    for (b, k) in buf.iter_mut().zip(OBFUSCATION_KEY.iter().cycle()) {
        *b ^= k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_involution() {
        let original: Vec<u8> = (0..=255u8).chain(0..=100u8).collect();
        let mut buf = original.clone();
        xor_obfuscate(&mut buf);
        assert_ne!(buf, original);
        xor_obfuscate(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn test_key_alignment() {
        let mut buf = [0u8; 7];
        xor_obfuscate(&mut buf);
        assert_eq!(&buf, b"mstarms");
    }
}
