use gcd::Gcd;
use rand::Rng;

/// Walks every offset in `0..size` exactly once, in pseudo-random order,
/// without storing the visited set.
///
/// The walk uses the multiplicative group of integers modulo a prime `p`
/// (the smallest prime above `size`):
///    - `x_{i+1} = x_i * g mod p`, where `g` is a primitive root, visits every
///      value of `1..p` once before returning to `x_0`.
///    - Values are shifted down by one so they cover `0..p-1`; anything
///      `>= size` is skipped and the recurrence applied again.
///    - `g` is a random power `r^k` of the smallest primitive root `r`, with
///      `gcd(k, p - 1) == 1`, so every seed yields its own ordering.
///
/// Since `p` is close to `size` the number of skipped values stays small.
///
/// For more information: <https://en.wikipedia.org/wiki/Primitive_root_modulo_n>
#[derive(Debug, Clone)]
pub struct AddressCycle {
    modulus: u64,
    generator: u64,
    current: u64,
    produced: u64,
    size: u64,
}

impl AddressCycle {
    /// Builds a cycle over `0..size` seeded from the thread RNG.
    pub fn new(size: u64) -> Self {
        Self::with_rng(size, &mut rand::rng())
    }

    /// Builds a cycle over `0..size` using the given RNG for the generator
    /// and the starting point.
    pub fn with_rng<R: Rng + ?Sized>(size: u64, rng: &mut R) -> Self {
        let modulus = next_prime_above(size);
        let order = modulus - 1;
        let root = smallest_primitive_root(modulus);
        let exponent = pick_random_coprime(order, rng);
        let generator = pow_mod(root, exponent, modulus);
        let current = rng.random_range(1..modulus);

        Self {
            modulus,
            generator,
            current,
            produced: 0,
            size,
        }
    }

    /// Number of offsets this cycle yields in total.
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Number of offsets still to come.
    pub const fn remaining(&self) -> u64 {
        self.size - self.produced
    }
}

impl Iterator for AddressCycle {
    type Item = u64;

    /// Advance the group walk until it lands inside `0..size`.
    ///
    /// Returns `None` once `size` offsets have been produced. The walk has
    /// period `p - 1`, so one full turn is always enough to find the next
    /// unvisited offset.
    fn next(&mut self) -> Option<Self::Item> {
        if self.produced >= self.size {
            return None;
        }

        for _ in 0..self.modulus {
            self.current = mul_mod(self.current, self.generator, self.modulus);
            let offset = self.current - 1;
            if offset < self.size {
                self.produced += 1;
                return Some(offset);
            }
        }

        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// Roughly 61% of random pairs are coprime, so a handful of draws almost
/// always succeeds. If it does not, `end - 1` is coprime with `end` by
/// construction, at the cost of a less scrambled walk.
///
/// Picks are kept away from both ends of the range, as exponents near
/// `0` or `end` produce generators close to the trivial ones.
fn pick_random_coprime<R: Rng + ?Sized>(end: u64, rng: &mut R) -> u64 {
    let range_boundary = end / 4;
    let lower_range = range_boundary;
    let upper_range = end - range_boundary;
    let mut candidate = rng.random_range(lower_range..upper_range);

    for _ in 0..10 {
        if end.gcd(candidate) == 1 {
            return candidate;
        }
        candidate = rng.random_range(lower_range..upper_range);
    }

    end - 1
}

const fn mul_mod(a: u64, b: u64, modulus: u64) -> u64 {
    ((a as u128 * b as u128) % modulus as u128) as u64
}

fn pow_mod(mut base: u64, mut exponent: u64, modulus: u64) -> u64 {
    let mut result = 1 % modulus;
    base %= modulus;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = mul_mod(result, base, modulus);
        }
        base = mul_mod(base, base, modulus);
        exponent >>= 1;
    }
    result
}

/// Deterministic Miller-Rabin; these bases cover every `u64`.
fn is_prime(n: u64) -> bool {
    const BASES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

    if n < 2 {
        return false;
    }
    for p in BASES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for a in BASES {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

fn next_prime_above(n: u64) -> u64 {
    let mut candidate = n + 1;
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

fn distinct_prime_factors(mut n: u64) -> Vec<u64> {
    let mut factors = Vec::new();
    let mut divisor = 2;
    while divisor * divisor <= n {
        if n % divisor == 0 {
            factors.push(divisor);
            while n % divisor == 0 {
                n /= divisor;
            }
        }
        divisor += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// `prime` must be prime. The group modulo 2 is trivial and generated by 1.
fn smallest_primitive_root(prime: u64) -> u64 {
    if prime == 2 {
        return 1;
    }
    let order = prime - 1;
    let factors = distinct_prime_factors(order);

    (2..prime)
        .find(|&candidate| {
            factors
                .iter()
                .all(|&q| pow_mod(candidate, order / q, prime) != 1)
        })
        .unwrap_or(prime - 1)
}
