//! Unit strings carried through formulas.
//!
//! A unit is a product of named factors with integer exponents, written the
//! way parameters declare them: `kW`, `$/kWh`, `kW*h`, `m^2`. Currency
//! symbols are read as their codes, so `$` and `USD` are the same factor, and
//! printed back as symbols.

use std::fmt;

const CURRENCY_SYMBOLS: [(&str, &str); 3] = [("$", "USD"), ("€", "EUR"), ("£", "GBP")];

#[derive(Clone, Debug, Default)]
pub struct Unit {
    // In first-seen order; exponents are never zero.
    factors: Vec<(String, i32)>,
}

impl Unit {
    /// Parses a declared unit.
    ///
    /// # Arguments
    /// * `text` - Unit as written on a parameter, e.g. `"$/kWh"`
    ///
    /// # Returns
    /// * `None` for blank or dimensionless text, otherwise the parsed unit
    ///
    /// # Examples
    /// ```
    /// use valuecalc::units::Unit;
    ///
    /// let rate = Unit::parse("$/kWh").unwrap();
    /// let energy = Unit::parse("kWh").unwrap();
    /// assert_eq!(rate.multiply(&energy).to_string(), "$");
    /// ```
    pub fn parse(text: &str) -> Option<Unit> {
        let mut unit = Unit::default();
        for (i, part) in text.split('/').enumerate() {
            let sign = if i == 0 { 1 } else { -1 };
            for factor in part.split(['*', '·']) {
                let factor = factor.trim();
                if factor.is_empty() || factor == "1" {
                    continue;
                }
                let (name, exponent) = match factor.split_once('^') {
                    Some((name, exp)) => (name.trim(), exp.trim().parse::<i32>().ok()?),
                    None => (factor, 1),
                };
                if name.is_empty() {
                    return None;
                }
                unit.add_factor(canonical(name), sign * exponent);
            }
        }
        (!unit.is_dimensionless()).then_some(unit)
    }

    pub fn is_dimensionless(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn multiply(&self, other: &Unit) -> Unit {
        let mut product = self.clone();
        for (name, exponent) in &other.factors {
            product.add_factor(name.clone(), *exponent);
        }
        product
    }

    pub fn divide(&self, other: &Unit) -> Unit {
        self.multiply(&other.powi(-1))
    }

    pub fn powi(&self, n: i32) -> Unit {
        let mut unit = Unit::default();
        for (name, exponent) in &self.factors {
            unit.add_factor(name.clone(), exponent * n);
        }
        unit
    }

    /// Square root, when every exponent is even.
    pub fn sqrt(&self) -> Option<Unit> {
        if self.factors.iter().any(|(_, e)| e % 2 != 0) {
            return None;
        }
        let mut unit = Unit::default();
        for (name, exponent) in &self.factors {
            unit.add_factor(name.clone(), exponent / 2);
        }
        Some(unit)
    }

    fn add_factor(&mut self, name: String, exponent: i32) {
        if exponent == 0 {
            return;
        }
        match self.factors.iter().position(|(n, _)| *n == name) {
            Some(i) => {
                self.factors[i].1 += exponent;
                if self.factors[i].1 == 0 {
                    self.factors.remove(i);
                }
            }
            None => self.factors.push((name, exponent)),
        }
    }

    fn sorted(&self) -> Vec<(&str, i32)> {
        let mut factors: Vec<(&str, i32)> =
            self.factors.iter().map(|(n, e)| (n.as_str(), *e)).collect();
        factors.sort();
        factors
    }
}

// Factor order does not matter: `kW*h` equals `h*kW`.
impl PartialEq for Unit {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl Eq for Unit {}

fn canonical(name: &str) -> String {
    CURRENCY_SYMBOLS
        .iter()
        .find(|(symbol, _)| *symbol == name)
        .map(|(_, code)| code.to_string())
        .unwrap_or_else(|| name.to_string())
}

fn symbol(name: &str) -> &str {
    CURRENCY_SYMBOLS
        .iter()
        .find(|(_, code)| *code == name)
        .map(|(symbol, _)| *symbol)
        .unwrap_or(name)
}

fn write_factor(f: &mut fmt::Formatter<'_>, name: &str, exponent: i32) -> fmt::Result {
    f.write_str(symbol(name))?;
    if exponent != 1 {
        write!(f, "^{}", exponent)?;
    }
    Ok(())
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numerator: Vec<&(String, i32)> = self.factors.iter().filter(|(_, e)| *e > 0).collect();
        if numerator.is_empty() {
            f.write_str("1")?;
        }
        for (i, (name, exponent)) in numerator.into_iter().enumerate() {
            if i > 0 {
                f.write_str("*")?;
            }
            write_factor(f, name, *exponent)?;
        }
        for (name, exponent) in self.factors.iter().filter(|(_, e)| *e < 0) {
            f.write_str("/")?;
            write_factor(f, name, -exponent)?;
        }
        Ok(())
    }
}
