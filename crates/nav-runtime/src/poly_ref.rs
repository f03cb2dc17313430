//! Salted polygon and tile references
//!
//! A reference packs `salt | tile index | polygon index` into 32 bits. The salt of a
//! tile slot changes every time the slot is freed, so references into a removed tile
//! stop resolving even after the slot is reused.

use serde::{Deserialize, Serialize};

use crate::Status;

/// Reference to a polygon of a loaded tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PolyRef(u32);

impl PolyRef {
    /// The reference that never resolves
    pub const NULL: PolyRef = PolyRef(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Reference to a loaded tile, the polygon reference of its polygon zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TileRef(u32);

impl TileRef {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    /// The polygon reference with the same salt and tile index
    pub const fn base_poly_ref(self) -> PolyRef {
        PolyRef(self.0)
    }
}

/// Bit split between salt, tile index and polygon index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefEncoding {
    pub salt_bits: u32,
    pub tile_bits: u32,
    pub poly_bits: u32,
}

impl RefEncoding {
    /// Fewest salt bits that still make slot reuse detectable
    pub const MIN_SALT_BITS: u32 = 10;

    /// Derives the split from the tile and per-tile polygon capacities
    pub fn for_capacity(max_tiles: u32, max_polys: u32) -> Result<Self, Status> {
        if max_tiles == 0 || max_polys == 0 {
            return Err(Status::FAILURE | Status::INVALID_PARAM);
        }
        let tile_bits = nav_common::ilog2(nav_common::next_pow2(max_tiles));
        let poly_bits = nav_common::ilog2(nav_common::next_pow2(max_polys));
        if tile_bits + poly_bits >= 32 {
            return Err(Status::FAILURE | Status::INVALID_PARAM);
        }
        let salt_bits = (32 - tile_bits - poly_bits).min(31);
        if salt_bits < Self::MIN_SALT_BITS {
            return Err(Status::FAILURE | Status::INVALID_PARAM);
        }
        Ok(Self {
            salt_bits,
            tile_bits,
            poly_bits,
        })
    }

    #[inline]
    fn mask(bits: u32) -> u32 {
        ((1u64 << bits) - 1) as u32
    }

    pub fn salt_mask(&self) -> u32 {
        Self::mask(self.salt_bits)
    }

    pub fn max_tiles(&self) -> usize {
        1usize << self.tile_bits
    }

    pub fn max_polys(&self) -> usize {
        1usize << self.poly_bits
    }

    #[inline]
    pub fn encode(&self, salt: u32, tile: u32, poly: u32) -> PolyRef {
        PolyRef(
            ((salt & self.salt_mask()) << (self.poly_bits + self.tile_bits))
                | ((tile & Self::mask(self.tile_bits)) << self.poly_bits)
                | (poly & Self::mask(self.poly_bits)),
        )
    }

    /// Splits a reference into `(salt, tile, poly)`
    #[inline]
    pub fn decode(&self, r: PolyRef) -> (u32, u32, u32) {
        let salt = (r.0 >> (self.poly_bits + self.tile_bits)) & self.salt_mask();
        let tile = (r.0 >> self.poly_bits) & Self::mask(self.tile_bits);
        let poly = r.0 & Self::mask(self.poly_bits);
        (salt, tile, poly)
    }

    #[inline]
    pub fn decode_tile(&self, r: PolyRef) -> u32 {
        (r.0 >> self.poly_bits) & Self::mask(self.tile_bits)
    }

    #[inline]
    pub fn decode_poly(&self, r: PolyRef) -> u32 {
        r.0 & Self::mask(self.poly_bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_split() {
        let enc = RefEncoding::for_capacity(1 << 14, 1 << 8).unwrap();
        assert_eq!(enc.tile_bits, 14);
        assert_eq!(enc.poly_bits, 8);
        assert_eq!(enc.salt_bits, 10);
        assert_eq!(enc.max_tiles() * enc.max_polys(), 1 << 22);
    }

    #[test]
    fn test_encode_decode() {
        let enc = RefEncoding::for_capacity(1 << 14, 1 << 8).unwrap();
        let r = enc.encode(5, 1234, 77);
        assert_eq!(enc.decode(r), (5, 1234, 77));
        assert_eq!(enc.decode_tile(r), 1234);
        assert_eq!(enc.decode_poly(r), 77);
    }

    #[test]
    fn test_capacity_needs_salt_bits() {
        assert!(RefEncoding::for_capacity(1 << 16, 1 << 10).is_err());
        assert!(RefEncoding::for_capacity(0, 16).is_err());
        // Non power of two capacities round up.
        let enc = RefEncoding::for_capacity(100, 50).unwrap();
        assert_eq!(enc.tile_bits, 7);
        assert_eq!(enc.poly_bits, 6);
    }
}
