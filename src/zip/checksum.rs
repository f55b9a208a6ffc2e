use crc32fast::Hasher;

/// Running CRC-32 over a member's payload.
#[derive(Debug, Clone, Default)]
pub struct Crc32 {
    hasher: Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Checksum of everything appended so far. Appending may continue afterwards.
    pub fn get(&self) -> u32 {
        self.hasher.clone().finalize()
    }
}
