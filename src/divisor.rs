// Replaces the per-pixel division in the blur kernel with a table lookup.
//
// The kernel accumulates channel values weighted by a triangle whose weights sum
// to `divsum = ((div + 1) >> 1)^2`. Every attainable sum is below `256 * divsum`,
// so `sum / divsum` can be precomputed once per radius.

pub struct DivisorTable {
    radius: u32,
    divsum: u32,
    quotients: Vec<u8>, // quotients[sum] = sum / divsum, len = 256 * divsum
}

impl DivisorTable {
    /// Build the table for `radius` (>= 1).
    pub fn new(radius: u32) -> Self {
        let div = 2 * radius + 1;
        let half = (div + 1) >> 1;
        let divsum = half * half;
        let len = 256 * divsum as usize;

        let mut quotients = Vec::with_capacity(len);
        for q in 0..=255u8 {
            // `divsum` consecutive sums share the same quotient.
            quotients.extend(std::iter::repeat_n(q, divsum as usize));
        }

        Self {
            radius,
            divsum,
            quotients,
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    pub fn divsum(&self) -> u32 {
        self.divsum
    }

    #[inline]
    pub fn lookup(&self, sum: u32) -> u8 {
        self.quotients[sum as usize]
    }
}
