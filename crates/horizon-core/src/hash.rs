//! Content hashing for determinism checks.
//!
//! Produces a SHA-256 digest of ray buffers or frames so repeated runs and
//! different backends can be compared bit for bit.

use sha2::{Digest, Sha256};

use crate::frame::FrameBuffer;
use crate::ray::RayState;

/// A content hash digest (SHA-256, 32 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    bytes: [u8; 32],
}

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn finish(hasher: Sha256) -> ContentHash {
    let result = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&result);
    ContentHash::from_bytes(bytes)
}

/// Hash the exact bit patterns of a ray buffer.
pub fn hash_rays(rays: &[RayState]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update((rays.len() as u64).to_le_bytes());
    hasher.update(bytemuck::cast_slice::<RayState, u8>(rays));
    finish(hasher)
}

/// Hash a frame, including its dimensions.
pub fn hash_frame(frame: &FrameBuffer) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(frame.width.to_le_bytes());
    hasher.update(frame.height.to_le_bytes());
    hasher.update(&frame.data);
    finish(hasher)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_rays_deterministic() {
        let rays = vec![RayState::new(10.0, 0.0, -1.0, 0.01, 1.0, 1.0); 8];
        assert_eq!(hash_rays(&rays), hash_rays(&rays.clone()));
    }

    #[test]
    fn test_hash_rays_sees_last_bit() {
        let a = vec![RayState::new(10.0, 0.0, -1.0, 0.01, 1.0, 1.0)];
        let mut b = a.clone();
        b[0].phi = f64::from_bits(b[0].phi.to_bits() + 1);
        assert_ne!(hash_rays(&a), hash_rays(&b));
    }

    #[test]
    fn test_hash_frame_includes_size() {
        let a = FrameBuffer::new(4, 2);
        let b = FrameBuffer::new(2, 4);
        assert_ne!(hash_frame(&a), hash_frame(&b));
    }

    #[test]
    fn test_hash_hex_format() {
        let hex = hash_rays(&[]).to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
