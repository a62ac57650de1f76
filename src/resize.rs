/// An insert that walks at least this many entries before appending triggers
/// a resize, unless configured otherwise.
pub const DEFAULT_COLLISION_THRESHOLD: usize = 10;

/// The default number of lock stripes.
///
/// This depends only on the machine, never on the table's capacity.
pub fn default_stripes() -> usize {
    (num_cpus::get() * 4).next_power_of_two()
}

/// Returns `true` if `n` is prime.
pub fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }

    if n < 4 {
        return true;
    }

    if n % 2 == 0 {
        return false;
    }

    let mut divisor = 3;
    while divisor <= n / divisor {
        if n % divisor == 0 {
            return false;
        }

        divisor += 2;
    }

    true
}

/// Returns the smallest prime that is `>= min`, or `None` if it does not fit
/// in a `usize`.
pub fn next_prime(min: usize) -> Option<usize> {
    let mut n = min.max(2);
    while !is_prime(n) {
        n = n.checked_add(1)?;
    }

    Some(n)
}

/// The number of buckets of a table created with the given capacity.
///
/// # Panics
///
/// Panics if no prime above `capacity` fits in a `usize`.
pub fn initial_size(capacity: usize) -> usize {
    next_prime(capacity.saturating_add(1)).expect("capacity overflow")
}

/// The number of buckets to grow to from `current`: the smallest prime that is
/// at least twice the current size and at least `min`.
pub fn grown_size(current: usize, min: usize) -> Option<usize> {
    next_prime(current.checked_mul(2)?.max(min))
}
