//! 2-of-3 Shamir secret sharing over GF(256).
//!
//! Every byte of the secret gets its own random line `f(x) = s + a*x`;
//! share `i` holds `f(i)` for `i` in 1..=3. Two points recover `f(0)`, one
//! point is uniformly random.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::secret_store::SecretError;

pub const SHARE_COUNT: usize = 3;
pub const THRESHOLD: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share {
    /// 1-based x coordinate, never zero
    pub index: u8,
    /// one y coordinate per secret byte
    pub data: Vec<u8>,
}

/// GF(256) multiplication with the AES polynomial x^8 + x^4 + x^3 + x + 1
fn gf256_mul(mut a: u8, mut b: u8) -> u8 {
    let mut result = 0u8;
    while b != 0 {
        if b & 1 != 0 {
            result ^= a;
        }
        let hi = a & 0x80;
        a <<= 1;
        if hi != 0 {
            a ^= 0x1b;
        }
        b >>= 1;
    }
    result
}

// a^254 = a^-1
fn gf256_inv(a: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    let mut result = a;
    for _ in 0..6 {
        result = gf256_mul(result, result);
        result = gf256_mul(result, a);
    }
    gf256_mul(result, result)
}

fn gf256_div(a: u8, b: u8) -> u8 {
    gf256_mul(a, gf256_inv(b))
}

fn poly_eval(coeffs: &[u8], x: u8) -> u8 {
    let mut result = 0u8;
    let mut x_power = 1u8;
    for &coeff in coeffs {
        result ^= gf256_mul(coeff, x_power);
        x_power = gf256_mul(x_power, x);
    }
    result
}

/// Lagrange interpolation at x = 0.
fn interpolate_at_zero(points: &[(u8, u8)]) -> u8 {
    let mut result = 0u8;
    for (i, &(xi, yi)) in points.iter().enumerate() {
        let mut num = 1u8;
        let mut den = 1u8;
        for (j, &(xj, _)) in points.iter().enumerate() {
            if i != j {
                // subtraction is xor in GF(256)
                num = gf256_mul(num, xj);
                den = gf256_mul(den, xi ^ xj);
            }
        }
        result ^= gf256_mul(yi, gf256_div(num, den));
    }
    result
}

/// Splits `secret` into three shares, any two of which recover it.
pub fn split<R: RngCore + ?Sized>(secret: &[u8], rng: &mut R) -> [Share; SHARE_COUNT] {
    let mut shares = [1u8, 2, 3].map(|index| Share {
        index,
        data: Vec::with_capacity(secret.len()),
    });
    let mut slopes = vec![0u8; secret.len()];
    rng.fill_bytes(&mut slopes);

    for (&byte, &slope) in secret.iter().zip(&slopes) {
        let coeffs = [byte, slope];
        for share in shares.iter_mut() {
            share.data.push(poly_eval(&coeffs, share.index));
        }
    }
    shares
}

/// Recovers the secret from at least two distinct shares.
pub fn combine(shares: &[Share]) -> Result<Vec<u8>, SecretError> {
    let mut used: Vec<&Share> = Vec::with_capacity(THRESHOLD);
    for share in shares {
        if share.index == 0 {
            return Err(SecretError::MalformedShard("share index 0".into()));
        }
        if used.iter().all(|u| u.index != share.index) {
            used.push(share);
        }
        if used.len() == THRESHOLD {
            break;
        }
    }
    if used.len() < THRESHOLD {
        return Err(SecretError::InsufficientShards {
            found: used.len(),
            required: THRESHOLD,
        });
    }
    let len = used[0].data.len();
    if used.iter().any(|s| s.data.len() != len) {
        return Err(SecretError::MalformedShard("share lengths differ".into()));
    }

    Ok((0..len)
        .map(|i| {
            let points: Vec<(u8, u8)> = used.iter().map(|s| (s.index, s.data[i])).collect();
            interpolate_at_zero(&points)
        })
        .collect())
}
