//! Kubernetes resource quantities with exact arithmetic.
//!
//! A quantity is stored as a signed count of nano-units plus the format it was
//! written in, so sums never lose precision ("100m" + "100m" is "200m") and
//! rendering follows the platform's canonical form.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity as K8sQuantity;
use serde::{Serialize, Serializer};

use crate::error::QuantityError;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Largest decimal exponent accepted in `e<exp>` notation.
const MAX_EXPONENT: i32 = 36;

const BINARY_SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

/// How a quantity is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// `m`, `k`, `M`, `G`, ... suffixes.
    #[default]
    DecimalSI,
    /// `Ki`, `Mi`, `Gi`, ... suffixes.
    BinarySI,
    /// `1e3` notation.
    DecimalExponent,
}

#[derive(Debug, Clone, Copy)]
enum Scale {
    Decimal(i32),
    Binary(u32),
}

/// A CPU or memory amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
    nanos: i128,
    format: Format,
}

impl Quantity {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    /// Parse a k8s-openapi quantity.
    pub fn from_k8s(quantity: &K8sQuantity) -> Result<Self, QuantityError> {
        quantity.0.parse()
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.is_empty() {
            return Err(QuantityError::Empty);
        }
        let invalid = || QuantityError::Invalid(input.to_string());
        let out_of_range = || QuantityError::OutOfRange(input.to_string());

        let (negative, rest) = match input.as_bytes()[0] {
            b'-' => (true, &input[1..]),
            b'+' => (false, &input[1..]),
            _ => (false, input),
        };

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_len);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(invalid());
        }

        let (format, scale) = parse_suffix(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
            input: input.to_string(),
            suffix: suffix.to_string(),
        })?;

        let mut mantissa: i128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .ok_or_else(out_of_range)?;
        }
        let fraction_digits = i32::try_from(fraction.len()).map_err(|_| out_of_range())?;

        let magnitude = match scale {
            Scale::Decimal(exponent) => {
                let shift = exponent + 9 - fraction_digits;
                if shift >= 0 {
                    10i128
                        .checked_pow(shift.unsigned_abs())
                        .and_then(|p| mantissa.checked_mul(p))
                        .ok_or_else(out_of_range)?
                } else {
                    div_ceil_pow10(mantissa, shift.unsigned_abs())
                }
            }
            Scale::Binary(bits) => {
                let scaled = mantissa
                    .checked_mul(1i128 << bits)
                    .and_then(|m| m.checked_mul(NANOS_PER_UNIT))
                    .ok_or_else(out_of_range)?;
                div_ceil_pow10(scaled, fraction_digits.unsigned_abs())
            }
        };

        Ok(Quantity {
            nanos: if negative { -magnitude } else { magnitude },
            format,
        })
    }
}

fn parse_suffix(suffix: &str) -> Option<(Format, Scale)> {
    let decimal = |exponent| Some((Format::DecimalSI, Scale::Decimal(exponent)));
    let binary = |bits| Some((Format::BinarySI, Scale::Binary(bits)));

    match suffix {
        "" => decimal(0),
        "n" => decimal(-9),
        "u" => decimal(-6),
        "m" => decimal(-3),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        "Ki" => binary(10),
        "Mi" => binary(20),
        "Gi" => binary(30),
        "Ti" => binary(40),
        "Pi" => binary(50),
        "Ei" => binary(60),
        _ => {
            let exponent: i32 = suffix.strip_prefix(['e', 'E'])?.parse().ok()?;
            if exponent.abs() > MAX_EXPONENT {
                return None;
            }
            Some((Format::DecimalExponent, Scale::Decimal(exponent)))
        }
    }
}

/// Divide a non-negative value by 10^exp, rounding up.
fn div_ceil_pow10(value: i128, exp: u32) -> i128 {
    match 10i128.checked_pow(exp) {
        Some(divisor) => {
            let quotient = value / divisor;
            if value % divisor != 0 {
                quotient + 1
            } else {
                quotient
            }
        }
        None => i128::from(value != 0),
    }
}

/// Split nano-units into the smallest integer mantissa with an exponent that
/// is a multiple of 3 in [-9, 18].
fn decimal_parts(nanos: i128) -> (i128, i32) {
    (-3..=6)
        .rev()
        .map(|step| step * 3)
        .find_map(|exponent: i32| {
            let divisor = 10i128.pow((exponent + 9).unsigned_abs());
            (nanos % divisor == 0).then(|| (nanos / divisor, exponent))
        })
        .unwrap_or((nanos, -9))
}

fn decimal_suffix(exponent: i32) -> &'static str {
    match exponent {
        -9 => "n",
        -6 => "u",
        -3 => "m",
        3 => "k",
        6 => "M",
        9 => "G",
        12 => "T",
        15 => "P",
        18 => "E",
        _ => "",
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return f.write_str("0");
        }

        let whole_units = (self.nanos % NANOS_PER_UNIT == 0).then(|| self.nanos / NANOS_PER_UNIT);
        match (self.format, whole_units) {
            // Below 1Ki binary suffixes add nothing; fractions fall back to decimal.
            (Format::BinarySI, Some(mut units)) if units.abs() >= 1024 => {
                let mut index = 0;
                while index < BINARY_SUFFIXES.len() - 1 && units % 1024 == 0 {
                    units /= 1024;
                    index += 1;
                }
                write!(f, "{}{}", units, BINARY_SUFFIXES[index])
            }
            (Format::DecimalExponent, _) => {
                let (mantissa, exponent) = decimal_parts(self.nanos);
                if exponent == 0 {
                    write!(f, "{}", mantissa)
                } else {
                    write!(f, "{}e{}", mantissa, exponent)
                }
            }
            _ => {
                let (mantissa, exponent) = decimal_parts(self.nanos);
                write!(f, "{}{}", mantissa, decimal_suffix(exponent))
            }
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.nanos == other.nanos
    }
}

impl Eq for Quantity {}

impl Add for Quantity {
    type Output = Quantity;

    /// A zero left operand adopts the right operand's format.
    fn add(self, rhs: Quantity) -> Quantity {
        let format = if self.nanos == 0 {
            rhs.format
        } else {
            self.format
        };
        Quantity {
            nanos: self.nanos.saturating_add(rhs.nanos),
            format,
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        *self = *self + rhs;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(text: &str) -> Quantity {
        text.parse().unwrap()
    }

    #[test]
    fn test_canonical_cpu() {
        assert_eq!(q("100m").to_string(), "100m");
        assert_eq!(q("0.1").to_string(), "100m");
        assert_eq!(q("1.5").to_string(), "1500m");
        assert_eq!(q("2").to_string(), "2");
        assert_eq!(q("2000m").to_string(), "2");
        assert_eq!(q("250000u").to_string(), "250m");
    }

    #[test]
    fn test_canonical_memory() {
        assert_eq!(q("64Mi").to_string(), "64Mi");
        assert_eq!(q("1.5Gi").to_string(), "1536Mi");
        assert_eq!(q("1024Ki").to_string(), "1Mi");
        assert_eq!(q("7934732Ki").to_string(), "7934732Ki");
        assert_eq!(q("1000").to_string(), "1k");
        assert_eq!(q("128M").to_string(), "128M");
        assert_eq!(q("1024").to_string(), "1024");
    }

    #[test]
    fn test_binary_below_one_ki_renders_decimal() {
        assert_eq!(q("0.5Ki").to_string(), "512");
        assert_eq!(q("0.5Ki").format, Format::BinarySI);
    }

    #[test]
    fn test_decimal_exponent() {
        assert_eq!(q("1e3").to_string(), "1e3");
        assert_eq!(q("12E3").to_string(), "12e3");
        assert_eq!(q("1e0").to_string(), "1");
        assert_eq!(q("1e3"), q("1k"));
    }

    #[test]
    fn test_sign_and_rounding() {
        assert_eq!(q("-100m").to_string(), "-100m");
        assert_eq!(q("+1").to_string(), "1");
        assert_eq!(q("-0").to_string(), "0");
        assert_eq!(q("0.5n").to_string(), "1n");
        assert_eq!(q(".5").to_string(), "500m");
        assert_eq!(q("5.").to_string(), "5");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!("".parse::<Quantity>(), Err(QuantityError::Empty));
        for bad in ["abc", "1.2.3", ".", "-", "m", " 1", "1 ", "--1", "1e", "1e1.5"] {
            assert!(bad.parse::<Quantity>().is_err(), "accepted {:?}", bad);
        }
        assert!(matches!(
            "10Zi".parse::<Quantity>(),
            Err(QuantityError::UnknownSuffix { .. })
        ));
    }

    #[test]
    fn test_parse_out_of_range() {
        assert!(matches!(
            "999999999999999999999Ei".parse::<Quantity>(),
            Err(QuantityError::OutOfRange(_))
        ));
        assert!("1e99".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_add_keeps_precision() {
        assert_eq!((q("100m") + q("100m")).to_string(), "200m");
        assert_eq!((q("64Mi") + q("64Mi")).to_string(), "128Mi");
        assert_eq!((q("500m") + q("1500m")).to_string(), "2");
        assert_eq!((q("1") + q("1n")).to_string(), "1000000001n");
    }

    #[test]
    fn test_zero_adopts_other_format() {
        assert_eq!((Quantity::zero() + q("64Mi")).to_string(), "64Mi");
        assert_eq!((q("64Mi") + Quantity::zero()).to_string(), "64Mi");
    }

    #[test]
    fn test_sum() {
        let total: Quantity = Vec::<Quantity>::new().into_iter().sum();
        assert!(total.is_zero());
        assert_eq!(total.to_string(), "0");

        let total: Quantity = ["0", "64Mi", "64Mi"].into_iter().map(q).sum();
        assert_eq!(total.to_string(), "128Mi");
    }

    #[test]
    fn test_add_commutative_and_associative() {
        let cpu = ["100m", "250m", "1", "1.5", "3", "0"];
        for a in cpu {
            for b in cpu {
                assert_eq!(
                    (q(a) + q(b)).to_string(),
                    (q(b) + q(a)).to_string(),
                    "{} + {}",
                    a,
                    b
                );
                for c in cpu {
                    assert_eq!(
                        ((q(a) + q(b)) + q(c)).to_string(),
                        (q(a) + (q(b) + q(c))).to_string()
                    );
                }
            }
        }

        let memory = ["64Mi", "1Gi", "512Ki", "0"];
        for a in memory {
            for b in memory {
                assert_eq!((q(a) + q(b)).to_string(), (q(b) + q(a)).to_string());
            }
        }
    }

    #[test]
    fn test_canonical_round_trip() {
        let sums = [
            q("100m") + q("333m"),
            q("64Mi") + q("1.5Gi"),
            q("1e3") + q("2e3"),
            q("7") + q("0.001"),
        ];
        for sum in sums {
            let text = sum.to_string();
            assert_eq!(q(&text).to_string(), text);
            assert_eq!(q(&text), sum);
        }
    }

    #[test]
    fn test_value_equality_ignores_format() {
        assert_eq!(q("1Ki"), q("1024"));
        assert_ne!(q("1Gi"), q("1G"));
    }

    #[test]
    fn test_from_k8s() {
        let quantity = K8sQuantity("250m".to_string());
        assert_eq!(Quantity::from_k8s(&quantity).unwrap().to_string(), "250m");
    }

    #[test]
    fn test_serialize_as_string() {
        assert_eq!(serde_json::to_string(&q("64Mi")).unwrap(), "\"64Mi\"");
    }
}
