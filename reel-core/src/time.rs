//! # Exact Media Time
//!
//! Rational numbers and integer stream time.
//!
//! Every timestamp path in the pipeline (codec timestamp -> frame index,
//! wall clock -> stream time, stream time -> sample offset) goes through
//! this module and is computed in `i128` integer arithmetic. Floating point
//! is only used for display.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Time base of [`MediaTime`]: one nanosecond.
const NANOSECOND: Rational = Rational::new_raw(1, NANOS_PER_SECOND);

// ============================================================================
// Rational
// ============================================================================

/// A `num/den` pair. Frame rates, time bases and playback speeds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rational {
    pub num: i64,
    pub den: i64,
}

impl Rational {
    /// Build without reducing. Usable in `const` context.
    pub const fn new_raw(num: i64, den: i64) -> Self {
        Self { num, den }
    }

    /// Build a reduced rational with a positive denominator.
    pub fn new(num: i64, den: i64) -> Self {
        if den == 0 {
            return Self { num, den: 0 };
        }
        let g = gcd(num as i128, den as i128).max(1);
        let sign = if den < 0 { -1 } else { 1 };
        Self {
            num: ((num as i128 / g) * sign) as i64,
            den: ((den as i128 / g) * sign) as i64,
        }
    }

    pub const fn from_integer(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    pub fn is_valid(&self) -> bool {
        self.den != 0
    }

    /// Strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        self.den != 0 && self.num != 0 && (self.num > 0) == (self.den > 0)
    }

    pub fn recip(self) -> Self {
        Self::new(self.den, self.num)
    }

    pub fn reduced(self) -> Self {
        Self::new(self.num, self.den)
    }

    /// Approximate value, for logs and UI only.
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// `value * from / to`, rounded toward negative infinity.
    pub fn rescale_floor(value: i64, from: Rational, to: Rational) -> i64 {
        let (n, d) = rescale_parts(value, from, to);
        saturate(div_floor(n, d))
    }

    /// `value * from / to`, rounded toward positive infinity.
    pub fn rescale_ceil(value: i64, from: Rational, to: Rational) -> i64 {
        let (n, d) = rescale_parts(value, from, to);
        saturate(-div_floor(-n, d))
    }

    /// `value * from / to`, rounded to nearest, ties away from zero.
    pub fn rescale_round(value: i64, from: Rational, to: Rational) -> i64 {
        let (n, d) = rescale_parts(value, from, to);
        saturate(div_round(n, d))
    }

    /// Parse `"24"`, `"30000/1001"`, `"30000:1001"` or a decimal like `"1.5"`.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some((num, den)) = text.split_once(|c: char| c == '/' || c == ':') {
            let num: i64 = num.trim().parse().ok()?;
            let den: i64 = den.trim().parse().ok()?;
            if den == 0 {
                return None;
            }
            return Some(Self::new(num, den));
        }

        if let Some((int_part, frac_part)) = text.split_once('.') {
            if frac_part.is_empty() || frac_part.len() > 9 || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let negative = int_part.starts_with('-');
            let int_digits = int_part.trim_start_matches(|c: char| c == '-' || c == '+');
            let int_value: i64 = if int_digits.is_empty() { 0 } else { int_digits.parse().ok()? };
            let den = 10i64.pow(frac_part.len() as u32);
            let frac_value: i64 = frac_part.parse().ok()?;
            let magnitude = int_value.checked_mul(den)?.checked_add(frac_value)?;
            let num = if negative { -magnitude } else { magnitude };
            return Some(Self::new(num, den));
        }

        text.parse::<i64>().ok().map(Self::from_integer)
    }
}

impl PartialEq for Rational {
    fn eq(&self, other: &Self) -> bool {
        self.num as i128 * other.den as i128 == other.num as i128 * self.den as i128
    }
}

impl Eq for Rational {}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.reduced();
        let b = other.reduced();
        (a.num as i128 * b.den as i128).cmp(&(b.num as i128 * a.den as i128))
    }
}

impl Mul for Rational {
    type Output = Rational;

    fn mul(self, rhs: Rational) -> Rational {
        let num = self.num as i128 * rhs.num as i128;
        let den = self.den as i128 * rhs.den as i128;
        let g = gcd(num, den).max(1);
        Rational::new(saturate(num / g), saturate(den / g))
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

fn rescale_parts(value: i64, from: Rational, to: Rational) -> (i128, i128) {
    let n = value as i128 * from.num as i128 * to.den as i128;
    let d = from.den as i128 * to.num as i128;
    if d == 0 {
        // Invalid rational on either side; collapse to zero rather than divide.
        return (0, 1);
    }
    (n, d)
}

fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

fn div_floor(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d != 0 && ((n < 0) != (d < 0)) {
        q - 1
    } else {
        q
    }
}

fn div_round(n: i128, d: i128) -> i128 {
    let (n, d) = if d < 0 { (-n, -d) } else { (n, d) };
    if n >= 0 {
        (n + d / 2) / d
    } else {
        -((-n + d / 2) / d)
    }
}

fn saturate(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

// ============================================================================
// MediaTime
// ============================================================================

/// Stream time in integer nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaTime(i64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Exact seconds value, e.g. `Rational::new(7, 24)`.
    pub fn from_seconds(seconds: Rational) -> Self {
        Self(Rational::rescale_round(1, seconds, NANOSECOND))
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self(saturate(duration.as_nanos() as i128))
    }

    /// Codec timestamp in `time_base` units to stream time.
    pub fn from_timestamp(ts: i64, time_base: Rational) -> Self {
        Self(Rational::rescale_round(ts, time_base, NANOSECOND))
    }

    /// Stream time to a timestamp in `time_base` units (floor).
    pub fn to_timestamp(self, time_base: Rational) -> i64 {
        Rational::rescale_floor(self.0, NANOSECOND, time_base)
    }

    /// Index of the frame that is on screen at this time.
    pub fn to_frame_index(self, frame_rate: Rational) -> i64 {
        Rational::rescale_floor(self.0, NANOSECOND, frame_rate.recip())
    }

    /// Start time of frame `index`, rounded up so that
    /// `from_frame_index(i, r).to_frame_index(r) == i`.
    pub fn from_frame_index(index: i64, frame_rate: Rational) -> Self {
        Self(Rational::rescale_ceil(index, frame_rate.recip(), NANOSECOND))
    }

    pub fn to_sample_offset(self, sample_rate: u32) -> i64 {
        self.to_frame_index(Rational::from_integer(i64::from(sample_rate)))
    }

    pub fn from_sample_offset(offset: i64, sample_rate: u32) -> Self {
        Self::from_frame_index(offset, Rational::from_integer(i64::from(sample_rate)))
    }

    /// `elapsed * speed` as a stream time delta (floor).
    pub fn scaled(elapsed: Duration, speed: Rational) -> Self {
        let nanos = saturate(elapsed.as_nanos() as i128);
        Self(Rational::rescale_floor(nanos, speed, Rational::from_integer(1)))
    }

    /// Approximate seconds, for logs and UI only.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SECOND as f64
    }
}

impl Add for MediaTime {
    type Output = MediaTime;

    fn add(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_add(rhs.0))
    }
}

impl Sub for MediaTime {
    type Output = MediaTime;

    fn sub(self, rhs: MediaTime) -> MediaTime {
        MediaTime(self.0.saturating_sub(rhs.0))
    }
}

impl fmt::Display for MediaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}
