use std::hash::{Hash, Hasher};

pub trait DigestHasher {
    fn input<I: Hash + ?Sized>(&mut self, input: &I);
}

impl DigestHasher for blake3::Hasher {
    fn input<I: Hash + ?Sized>(&mut self, input: &I) {
        // Integers are written little-endian with a fixed width so digests
        // are the same on every platform.
        struct StdHasher<'a>(&'a mut blake3::Hasher);

        impl<'a> Hasher for StdHasher<'a> {
            fn finish(&self) -> u64 {
                panic!("a digest hasher has no 64-bit output");
            }

            fn write(&mut self, bytes: &[u8]) {
                self.0.update(bytes);
            }

            fn write_u8(&mut self, i: u8) {
                self.0.update(&[i]);
            }

            fn write_u16(&mut self, i: u16) {
                self.0.update(&i.to_le_bytes());
            }

            fn write_u32(&mut self, i: u32) {
                self.0.update(&i.to_le_bytes());
            }

            fn write_u64(&mut self, i: u64) {
                self.0.update(&i.to_le_bytes());
            }

            fn write_usize(&mut self, i: usize) {
                self.write_u64(i as u64);
            }

            fn write_i64(&mut self, i: i64) {
                self.write_u64(i as u64);
            }

            fn write_isize(&mut self, i: isize) {
                self.write_u64(i as u64);
            }
        }

        input.hash(&mut StdHasher(self))
    }
}

/// Hex encoded blake3 digest of `input`.
pub fn digest<I: Hash + ?Sized>(input: &I) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.input(input);
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_hex_encoded_256_bits() {
        let hash = digest("web");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn adjacent_strings_do_not_alias() {
        let joined = vec!["ab".to_string()];
        let split = vec!["a".to_string(), "b".to_string()];
        assert_ne!(digest(&joined), digest(&split));
    }
}
