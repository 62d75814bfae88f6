use std::fmt;

use crate::error::CompileError;

/// Digits kept after the decimal point when printing.
pub const PRECISION: usize = 10;

const EPSILON: f64 = 1e-11;

/// Conversion factors to each family's canonical unit.
const UNIT_FAMILIES: &[&[(&str, f64)]] = &[
    &[
        ("px", 1.0),
        ("in", 96.0),
        ("cm", 96.0 / 2.54),
        ("mm", 96.0 / 25.4),
        ("q", 96.0 / 101.6),
        ("pt", 96.0 / 72.0),
        ("pc", 16.0),
    ],
    &[
        ("deg", 1.0),
        ("grad", 0.9),
        ("rad", 180.0 / std::f64::consts::PI),
        ("turn", 360.0),
    ],
    &[("s", 1.0), ("ms", 0.001)],
    &[("hz", 1.0), ("khz", 1000.0)],
    &[("dpi", 1.0), ("dpcm", 2.54), ("dppx", 96.0), ("x", 96.0)],
];

fn family_factor(unit: &str) -> Option<(usize, f64)> {
    let lower = unit.to_ascii_lowercase();
    UNIT_FAMILIES.iter().enumerate().find_map(|(family, units)| {
        units
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, factor)| (family, *factor))
    })
}

/// Multiplier turning a value in `from` into a value in `to`.
pub fn conversion_factor(from: &str, to: &str) -> Option<f64> {
    if from.eq_ignore_ascii_case(to) {
        return Some(1.0);
    }
    let (from_family, from_factor) = family_factor(from)?;
    let (to_family, to_factor) = family_factor(to)?;
    (from_family == to_family).then(|| from_factor / to_factor)
}

pub fn fuzzy_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// Print a number with at most [`PRECISION`] decimals and no trailing zeros.
pub fn format_number(value: f64, compressed: bool) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let mut text = format!("{:.*}", PRECISION, value);
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    if text == "-0" {
        text = "0".to_string();
    }
    if compressed {
        if let Some(rest) = text.strip_prefix("0.") {
            text = format!(".{}", rest);
        } else if let Some(rest) = text.strip_prefix("-0.") {
            text = format!("-.{}", rest);
        }
    }
    text
}

/// A number with numerator and denominator units, e.g. `3px*em/s`.
#[derive(Debug, Clone)]
pub struct Number {
    pub value: f64,
    pub numer: Vec<String>,
    pub denom: Vec<String>,
}

impl Number {
    pub fn new(value: f64, unit: &str) -> Self {
        Number {
            value,
            numer: if unit.is_empty() {
                Vec::new()
            } else {
                vec![unit.to_string()]
            },
            denom: Vec::new(),
        }
    }

    pub fn unitless(value: f64) -> Self {
        Number::new(value, "")
    }

    pub fn with_value(&self, value: f64) -> Self {
        Number {
            value,
            numer: self.numer.clone(),
            denom: self.denom.clone(),
        }
    }

    pub fn is_unitless(&self) -> bool {
        self.numer.is_empty() && self.denom.is_empty()
    }

    pub fn has_complex_units(&self) -> bool {
        self.numer.len() > 1 || !self.denom.is_empty()
    }

    pub fn has_unit(&self, unit: &str) -> bool {
        self.numer.len() == 1 && self.denom.is_empty() && self.numer[0].eq_ignore_ascii_case(unit)
    }

    pub fn is_int(&self) -> bool {
        fuzzy_eq(self.value, self.value.round())
    }

    /// The value rounded to an integer when it is one.
    pub fn as_int(&self) -> Option<i64> {
        self.is_int().then(|| self.value.round() as i64)
    }

    pub fn unit(&self) -> String {
        let mut out = self.numer.join("*");
        if !self.denom.is_empty() {
            out.push('/');
            out.push_str(&self.denom.join("*"));
        }
        out
    }

    /// This number's value expressed in `numer`/`denom` units, if compatible.
    fn value_in(&self, numer: &[String], denom: &[String]) -> Option<f64> {
        if self.is_unitless() || (numer.is_empty() && denom.is_empty()) {
            return Some(self.value);
        }
        let mut value = self.value;
        let mut from_numer = self.numer.clone();
        for unit in numer {
            let idx = from_numer
                .iter()
                .position(|u| conversion_factor(u, unit).is_some())?;
            value *= conversion_factor(&from_numer.remove(idx), unit)?;
        }
        let mut from_denom = self.denom.clone();
        for unit in denom {
            let idx = from_denom
                .iter()
                .position(|u| conversion_factor(u, unit).is_some())?;
            value /= conversion_factor(&from_denom.remove(idx), unit)?;
        }
        (from_numer.is_empty() && from_denom.is_empty()).then_some(value)
    }

    pub fn is_comparable_to(&self, other: &Number) -> bool {
        self.value_in(&other.numer, &other.denom).is_some()
    }

    /// Convert into `other`'s units.
    pub fn coerce_to(&self, other: &Number) -> Result<f64, CompileError> {
        self.value_in(&other.numer, &other.denom)
            .ok_or_else(|| CompileError::IncompatibleUnits(self.unit(), other.unit()))
    }

    /// Convert into a single named unit.
    pub fn convert(&self, unit: &str) -> Option<f64> {
        self.value_in(&[unit.to_string()], &[])
    }

    /// Operand pair for an additive operation: both values in the units of
    /// whichever side has units.
    fn align(&self, other: &Number) -> Result<(f64, f64, Number), CompileError> {
        if self.is_unitless() {
            return Ok((self.value, other.value, other.clone()));
        }
        if other.is_unitless() {
            return Ok((self.value, other.value, self.clone()));
        }
        let right = other.coerce_to(self)?;
        Ok((self.value, right, self.clone()))
    }

    pub fn add(&self, other: &Number) -> Result<Number, CompileError> {
        let (a, b, units) = self.align(other)?;
        Ok(units.with_value(a + b))
    }

    pub fn sub(&self, other: &Number) -> Result<Number, CompileError> {
        let (a, b, units) = self.align(other)?;
        Ok(units.with_value(a - b))
    }

    pub fn rem(&self, other: &Number) -> Result<Number, CompileError> {
        let (a, b, units) = self.align(other)?;
        let mut result = a % b;
        if result != 0.0 && (result < 0.0) != (b < 0.0) {
            result += b;
        }
        Ok(units.with_value(result))
    }

    pub fn mul(&self, other: &Number) -> Number {
        let mut numer = self.numer.clone();
        numer.extend(other.numer.iter().cloned());
        let mut denom = self.denom.clone();
        denom.extend(other.denom.iter().cloned());
        Number::simplified(self.value * other.value, numer, denom)
    }

    pub fn div(&self, other: &Number) -> Number {
        let mut numer = self.numer.clone();
        numer.extend(other.denom.iter().cloned());
        let mut denom = self.denom.clone();
        denom.extend(other.numer.iter().cloned());
        Number::simplified(self.value / other.value, numer, denom)
    }

    /// Cancel numerator units against compatible denominator units.
    fn simplified(mut value: f64, numer: Vec<String>, mut denom: Vec<String>) -> Number {
        let mut kept = Vec::with_capacity(numer.len());
        for unit in numer {
            match denom
                .iter()
                .position(|d| conversion_factor(&unit, d).is_some())
            {
                Some(idx) => {
                    let other = denom.remove(idx);
                    value *= conversion_factor(&unit, &other).unwrap_or(1.0);
                }
                None => kept.push(unit),
            }
        }
        Number {
            value,
            numer: kept,
            denom,
        }
    }

    /// Equality after unit conversion. Unitless and united numbers differ.
    pub fn equals(&self, other: &Number) -> bool {
        if self.is_unitless() != other.is_unitless() {
            return false;
        }
        match other.value_in(&self.numer, &self.denom) {
            Some(value) => fuzzy_eq(self.value, value),
            None => false,
        }
    }

    pub fn compare(&self, other: &Number) -> Result<std::cmp::Ordering, CompileError> {
        let (a, b, _) = self.align(other)?;
        if fuzzy_eq(a, b) {
            return Ok(std::cmp::Ordering::Equal);
        }
        Ok(a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal))
    }

    pub fn to_css(&self, compressed: bool) -> Result<String, CompileError> {
        if self.has_complex_units() {
            return Err(CompileError::InvalidCss(self.to_string()));
        }
        let mut text = format_number(self.value, compressed);
        text.push_str(&self.unit());
        Ok(text)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", format_number(self.value, false), self.unit())
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_with_fixed_precision() {
        assert_eq!(format_number(2.0, false), "2");
        assert_eq!(format_number(1.0 / 3.0, false), "0.3333333333");
        assert_eq!(format_number(0.5, true), ".5");
        assert_eq!(format_number(-0.25, true), "-.25");
        assert_eq!(format_number(-0.0000000000001, false), "0");
    }

    #[test]
    fn converts_within_a_family() {
        let inch = Number::new(1.0, "in");
        let sum = inch.add(&Number::new(4.0, "px")).unwrap();
        assert_eq!(sum.unit(), "in");
        assert!(fuzzy_eq(sum.value, 1.0 + 4.0 / 96.0));
        assert!(matches!(
            inch.add(&Number::new(1.0, "s")),
            Err(CompileError::IncompatibleUnits(..))
        ));
    }

    #[test]
    fn multiplication_builds_and_cancels_units() {
        let area = Number::new(2.0, "px").mul(&Number::new(3.0, "px"));
        assert_eq!(area.unit(), "px*px");
        assert!(area.to_css(false).is_err());
        let ratio = Number::new(1.0, "in").div(&Number::new(1.0, "px"));
        assert!(ratio.is_unitless());
        assert!(fuzzy_eq(ratio.value, 96.0));
    }

    #[test]
    fn modulo_follows_the_divisor_sign() {
        let r = Number::unitless(-5.0).rem(&Number::unitless(3.0)).unwrap();
        assert!(fuzzy_eq(r.value, 1.0));
    }

    #[test]
    fn unitless_differs_from_united_in_equality() {
        assert_ne!(Number::new(1.0, "px"), Number::unitless(1.0));
        assert_eq!(Number::new(1.0, "in"), Number::new(96.0, "px"));
    }
}
