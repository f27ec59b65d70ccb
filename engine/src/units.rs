//! Physical quantities and units.
//!
//! Quantities are always normalized to SI base units (`m`, `kg`, `s`, `A`,
//! `K`, `mol`, `cd`) so that values given in different units of the same
//! dimensionality can be compared directly. Unit strings are parsed by a
//! [`UnitRegistry`], which is an ordinary value: there is no global registry.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Relative tolerance used when comparing magnitudes in base units.
pub const RELATIVE_TOLERANCE: f64 = 1e-9;

const BASE_DIMENSIONS: [&str; 7] = [
    "length",
    "mass",
    "time",
    "current",
    "temperature",
    "substance",
    "luminosity",
];

const LENGTH: usize = 0;
const MASS: usize = 1;
const TIME: usize = 2;
const CURRENT: usize = 3;
const TEMPERATURE: usize = 4;
const SUBSTANCE: usize = 5;
const LUMINOSITY: usize = 6;

const PREFIXES: [(&str, f64); 21] = [
    ("da", 1e1),
    ("Y", 1e24),
    ("Z", 1e21),
    ("E", 1e18),
    ("P", 1e15),
    ("T", 1e12),
    ("G", 1e9),
    ("M", 1e6),
    ("k", 1e3),
    ("h", 1e2),
    ("d", 1e-1),
    ("c", 1e-2),
    ("m", 1e-3),
    ("µ", 1e-6),
    ("μ", 1e-6),
    ("u", 1e-6),
    ("n", 1e-9),
    ("p", 1e-12),
    ("f", 1e-15),
    ("a", 1e-18),
    ("z", 1e-21),
];

/// Errors from parsing unit expressions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("empty unit expression")]
    Empty,

    #[error("unknown unit: {0}")]
    UnknownUnit(String),

    #[error("invalid exponent in unit expression: {0}")]
    InvalidExponent(String),

    #[error("dimension exponent out of range")]
    ExponentOutOfRange,
}

/// Exponents of the seven SI base dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimensionality([i8; 7]);

impl Dimensionality {
    /// The dimensionality of pure numbers.
    pub fn dimensionless() -> Self {
        Self::default()
    }

    fn base(index: usize) -> Self {
        let mut exponents = [0; 7];
        exponents[index] = 1;
        Self(exponents)
    }

    /// Build from exponents in the order length, mass, time, current,
    /// temperature, substance, luminosity.
    const fn from_exponents(exponents: [i8; 7]) -> Self {
        Self(exponents)
    }

    pub fn is_dimensionless(&self) -> bool {
        self.0.iter().all(|e| *e == 0)
    }

    fn combine(self, other: Self, sign: i8) -> Result<Self, UnitError> {
        let mut exponents = self.0;
        for (e, o) in exponents.iter_mut().zip(other.0) {
            let current = *e;
            *e = sign
                .checked_mul(o)
                .and_then(|o| current.checked_add(o))
                .ok_or(UnitError::ExponentOutOfRange)?;
        }
        Ok(Self(exponents))
    }

    fn powi(self, power: i8) -> Result<Self, UnitError> {
        let mut exponents = self.0;
        for e in exponents.iter_mut() {
            *e = e.checked_mul(power).ok_or(UnitError::ExponentOutOfRange)?;
        }
        Ok(Self(exponents))
    }
}

impl fmt::Display for Dimensionality {
    /// Formats like `[length] * [mass] / [time] ** 2`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "dimensionless");
        }
        let term = |name: &str, exponent: i8| {
            if exponent == 1 {
                format!("[{}]", name)
            } else {
                format!("[{}] ** {}", name, exponent)
            }
        };
        let numerator: Vec<String> = BASE_DIMENSIONS
            .iter()
            .zip(self.0)
            .filter(|(_, e)| *e > 0)
            .map(|(name, e)| term(name, e))
            .collect();
        let denominator: Vec<String> = BASE_DIMENSIONS
            .iter()
            .zip(self.0)
            .filter(|(_, e)| *e < 0)
            .map(|(name, e)| term(name, -e))
            .collect();

        if numerator.is_empty() {
            write!(f, "1")?;
        } else {
            write!(f, "{}", numerator.join(" * "))?;
        }
        for d in denominator {
            write!(f, " / {}", d)?;
        }
        Ok(())
    }
}

impl FromStr for Dimensionality {
    type Err = UnitError;

    /// Parses the [`fmt::Display`] format back.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Err(UnitError::Empty);
        }
        if text == "dimensionless" {
            return Ok(Self::dimensionless());
        }

        let normalized = text.replace("**", "^");
        let mut result = Self::dimensionless();
        let mut sign = 1;
        for part in normalized.split_inclusive(|c: char| c == '*' || c == '/') {
            let (factor, next_sign) = match part.strip_suffix('/') {
                Some(factor) => (factor, -1),
                None => (part.strip_suffix('*').unwrap_or(part), 1),
            };
            result = result.combine(parse_dimension_factor(factor.trim())?, sign)?;
            sign = next_sign;
        }
        Ok(result)
    }
}

fn parse_dimension_factor(factor: &str) -> Result<Dimensionality, UnitError> {
    if factor == "1" {
        return Ok(Dimensionality::dimensionless());
    }
    let (name, power) = match factor.split_once('^') {
        Some((name, exponent)) => {
            let power: i8 = exponent
                .trim()
                .parse()
                .map_err(|_| UnitError::InvalidExponent(exponent.to_string()))?;
            (name.trim(), power)
        }
        None => (factor, 1),
    };
    let index = name
        .strip_prefix('[')
        .and_then(|n| n.strip_suffix(']'))
        .and_then(|n| BASE_DIMENSIONS.iter().position(|d| *d == n))
        .ok_or_else(|| UnitError::UnknownUnit(factor.to_string()))?;
    Dimensionality::base(index).powi(power)
}

/// A unit expressed as a factor to base units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unit {
    pub factor: f64,
    pub dimensionality: Dimensionality,
}

impl Unit {
    fn new(factor: f64, dimensionality: Dimensionality) -> Self {
        Self {
            factor,
            dimensionality,
        }
    }

    fn dimensionless() -> Self {
        Self::new(1.0, Dimensionality::dimensionless())
    }

    fn mul(self, other: Unit) -> Result<Self, UnitError> {
        Ok(Self::new(
            self.factor * other.factor,
            self.dimensionality.combine(other.dimensionality, 1)?,
        ))
    }

    fn div(self, other: Unit) -> Result<Self, UnitError> {
        Ok(Self::new(
            self.factor / other.factor,
            self.dimensionality.combine(other.dimensionality, -1)?,
        ))
    }

    fn powi(self, power: i8) -> Result<Self, UnitError> {
        Ok(Self::new(
            self.factor.powi(i32::from(power)),
            self.dimensionality.powi(power)?,
        ))
    }
}

#[derive(Debug, Clone, Copy)]
struct UnitDef {
    unit: Unit,
    prefixable: bool,
}

/// A physical quantity normalized to base units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quantity {
    pub magnitude_in_base_units: f64,
    pub dimensionality: Dimensionality,
}

impl Quantity {
    pub fn new(magnitude_in_base_units: f64, dimensionality: Dimensionality) -> Self {
        Self {
            magnitude_in_base_units,
            dimensionality,
        }
    }

    /// Compare two quantities.
    ///
    /// Returns `None` when the dimensionalities differ. Magnitudes within
    /// [`RELATIVE_TOLERANCE`] of each other are equal.
    pub fn compare(&self, other: &Quantity) -> Option<Ordering> {
        if self.dimensionality != other.dimensionality {
            return None;
        }
        let a = self.magnitude_in_base_units;
        let b = other.magnitude_in_base_units;
        if (a - b).abs() <= RELATIVE_TOLERANCE * a.abs().max(b.abs()) {
            Some(Ordering::Equal)
        } else {
            a.partial_cmp(&b)
        }
    }
}

/// Lookup table of known units.
#[derive(Debug, Clone)]
pub struct UnitRegistry {
    units: HashMap<String, UnitDef>,
}

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitRegistry {
    /// Create a registry with SI base and common derived units.
    pub fn new() -> Self {
        let mut registry = Self {
            units: HashMap::new(),
        };

        let length = Dimensionality::base(LENGTH);
        let mass = Dimensionality::base(MASS);
        let time = Dimensionality::base(TIME);
        let current = Dimensionality::base(CURRENT);
        let dimensionless = Dimensionality::dimensionless();

        let m = Unit::new(1.0, length);
        let s = Unit::new(1.0, time);
        let a = Unit::new(1.0, current);

        // derived SI units as exponents of m, kg, s, A
        let derived = |exponents: [i8; 4]| {
            let [l, k, t, i] = exponents;
            Unit::new(1.0, Dimensionality::from_exponents([l, k, t, i, 0, 0, 0]))
        };
        let newton = derived([1, 1, -2, 0]);
        let pascal = derived([-1, 1, -2, 0]);
        let joule = derived([2, 1, -2, 0]);
        let watt = derived([2, 1, -3, 0]);
        let coulomb = derived([0, 0, 1, 1]);
        let volt = derived([2, 1, -3, -1]);
        let ohm = derived([2, 1, -3, -2]);
        let tesla = derived([0, 1, -2, -1]);
        let liter = Unit::new(1e-3, derived([3, 0, 0, 0]).dimensionality);

        registry.define(&["m", "meter", "metre"], m, true);
        registry.define(&["g", "gram"], Unit::new(1e-3, mass), true);
        registry.define(&["s", "second", "sec"], s, true);
        registry.define(&["A", "ampere"], a, true);
        registry.define(
            &["K", "kelvin"],
            Unit::new(1.0, Dimensionality::base(TEMPERATURE)),
            true,
        );
        registry.define(
            &["mol", "mole"],
            Unit::new(1.0, Dimensionality::base(SUBSTANCE)),
            true,
        );
        registry.define(
            &["cd", "candela"],
            Unit::new(1.0, Dimensionality::base(LUMINOSITY)),
            true,
        );

        registry.define(&["L", "l", "liter", "litre"], liter, true);
        registry.define(&["Hz", "hertz"], derived([0, 0, -1, 0]), true);
        registry.define(&["N", "newton"], newton, true);
        registry.define(&["Pa", "pascal"], pascal, true);
        registry.define(&["J", "joule"], joule, true);
        registry.define(&["W", "watt"], watt, true);
        registry.define(&["C", "coulomb"], coulomb, true);
        registry.define(&["V", "volt"], volt, true);
        registry.define(&["ohm", "Ω"], ohm, true);
        registry.define(&["T", "tesla"], tesla, true);
        registry.define(&["eV"], Unit::new(1.602_176_634e-19, joule.dimensionality), true);
        registry.define(&["bar"], Unit::new(1e5, pascal.dimensionality), true);

        registry.define(&["min", "minute"], Unit::new(60.0, time), false);
        registry.define(&["h", "hour"], Unit::new(3600.0, time), false);
        registry.define(&["d", "day"], Unit::new(86400.0, time), false);
        registry.define(&["atm"], Unit::new(101_325.0, pascal.dimensionality), false);
        registry.define(&["percent", "%"], Unit::new(1e-2, dimensionless), false);
        registry.define(&["rad", "radian"], Unit::new(1.0, dimensionless), false);
        registry.define(
            &["deg", "degree", "°"],
            Unit::new(std::f64::consts::PI / 180.0, dimensionless),
            false,
        );

        registry
    }

    fn define(&mut self, names: &[&str], unit: Unit, prefixable: bool) {
        for name in names {
            self.units
                .insert((*name).to_string(), UnitDef { unit, prefixable });
        }
    }

    /// Parse a unit expression such as `mm`, `km/h`, `kg*m/s**2` or `m^3`.
    ///
    /// An empty expression is rejected; callers handling plain numbers
    /// should use [`UnitRegistry::quantity`] which treats it as dimensionless.
    pub fn parse_units(&self, text: &str) -> Result<Unit, UnitError> {
        let normalized = text
            .trim()
            .replace("**", "^")
            .replace('·', "*")
            .replace('²', "^2")
            .replace('³', "^3");
        if normalized.is_empty() {
            return Err(UnitError::Empty);
        }

        let mut result = Unit::dimensionless();
        let mut current = String::new();
        let mut divide = false;
        for c in normalized.chars() {
            if c == '*' || c == '/' {
                result = self.apply_factor(result, &current, divide)?;
                current.clear();
                divide = c == '/';
            } else {
                current.push(c);
            }
        }
        result = self.apply_factor(result, &current, divide)?;

        Ok(result)
    }

    fn apply_factor(&self, unit: Unit, factor: &str, divide: bool) -> Result<Unit, UnitError> {
        let factor = self.parse_factor(factor)?;
        if divide {
            unit.div(factor)
        } else {
            unit.mul(factor)
        }
    }

    fn parse_factor(&self, factor: &str) -> Result<Unit, UnitError> {
        let (name, power) = match factor.split_once('^') {
            Some((name, exponent)) => {
                let power: i8 = exponent
                    .trim()
                    .parse()
                    .map_err(|_| UnitError::InvalidExponent(exponent.to_string()))?;
                (name.trim(), power)
            }
            None => (factor.trim(), 1),
        };

        if name.is_empty() {
            return Err(UnitError::UnknownUnit(factor.to_string()));
        }
        if name == "1" {
            return Ok(Unit::dimensionless());
        }

        self.lookup(name)
            .ok_or_else(|| UnitError::UnknownUnit(name.to_string()))?
            .powi(power)
    }

    fn lookup(&self, name: &str) -> Option<Unit> {
        if let Some(def) = self.units.get(name) {
            return Some(def.unit);
        }
        PREFIXES.iter().find_map(|(prefix, scale)| {
            let rest = name.strip_prefix(prefix)?;
            let def = self.units.get(rest).filter(|def| def.prefixable)?;
            Some(Unit::new(def.unit.factor * scale, def.unit.dimensionality))
        })
    }

    /// Build a quantity from a magnitude and a (possibly empty) unit string.
    pub fn quantity(&self, magnitude: f64, units: &str) -> Result<Quantity, UnitError> {
        let unit = if units.trim().is_empty() {
            Unit::dimensionless()
        } else {
            self.parse_units(units)?
        };
        Ok(Quantity::new(magnitude * unit.factor, unit.dimensionality))
    }

    /// Dimensionality of a unit string, if it can be parsed.
    pub fn dimensionality_of(&self, units: &str) -> Option<Dimensionality> {
        if units.trim().is_empty() || units.trim() == "1" {
            return Some(Dimensionality::dimensionless());
        }
        self.parse_units(units).ok().map(|u| u.dimensionality)
    }
}
