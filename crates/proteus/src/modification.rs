use serde::{Deserialize, Serialize};
use std::fmt::{Display, Write};

/// How the last retained digit is chosen when formatting a mass
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Ties are rounded away from zero
    #[default]
    HalfUp,
    /// Ties are rounded to the nearest even digit
    HalfEven,
    /// Extra digits are truncated towards zero
    Down,
}

impl Rounding {
    /// Whether the kept digits are incremented, given the first dropped
    /// digits and the parity of the last kept digit
    fn round_up(self, dropped: &[u8], last_odd: bool) -> bool {
        match (self, dropped.split_first()) {
            (_, None) | (Rounding::Down, _) => false,
            (Rounding::HalfUp, Some((&first, _))) => first >= 5,
            (Rounding::HalfEven, Some((&first, rest))) => {
                first > 5 || (first == 5 && (last_odd || rest.iter().any(|&d| d > 0)))
            }
        }
    }
}

/// Shortest round-trip decimal digits of `|value|`, with the number of
/// digits in front of the decimal point (may be zero or negative)
fn decimal_digits(value: f64) -> (Vec<u8>, i32) {
    let mut buffer = ryu::Buffer::new();
    let repr = buffer.format_finite(value.abs());
    let (mantissa, exponent) = match repr.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (repr, 0),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = int.bytes().chain(frac.bytes()).map(|b| b - b'0').collect();
    (digits, int.len() as i32 + exponent)
}

/// Stateless formatter for mass shifts. Trailing zeros are never printed,
/// so `57.0` is written as `57`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MassFormat {
    pub decimals: u32,
    pub rounding: Rounding,
    pub decimal_separator: char,
}

impl Default for MassFormat {
    fn default() -> Self {
        Self {
            decimals: 4,
            rounding: Rounding::HalfUp,
            decimal_separator: '.',
        }
    }
}

impl MassFormat {
    pub fn format(&self, value: f64) -> String {
        if !value.is_finite() {
            return value.to_string();
        }
        let (mut digits, mut point) = decimal_digits(value);

        let keep = point + self.decimals as i32;
        if keep < 0 {
            // Below half of the last decimal place
            digits.clear();
        } else if (keep as usize) < digits.len() {
            let (kept, dropped) = digits.split_at(keep as usize);
            let last_odd = kept.last().map_or(false, |d| d % 2 == 1);
            let up = self.rounding.round_up(dropped, last_odd);
            digits.truncate(keep as usize);
            if up {
                let mut carry = true;
                for d in digits.iter_mut().rev() {
                    *d += 1;
                    carry = *d == 10;
                    if !carry {
                        break;
                    }
                    *d = 0;
                }
                if carry {
                    digits.insert(0, 1);
                    point += 1;
                }
            }
        }

        let (int, frac) = match point {
            p if p <= 0 => {
                let mut frac = vec![0; p.unsigned_abs() as usize];
                frac.extend(&digits);
                (Vec::new(), frac)
            }
            p => {
                let p = p as usize;
                if digits.len() < p {
                    digits.resize(p, 0);
                }
                let frac = digits.split_off(p);
                (digits, frac)
            }
        };

        let to_str = |ds: &[u8]| ds.iter().map(|d| (b'0' + d) as char).collect::<String>();
        let int = to_str(&int).trim_start_matches('0').to_string();
        let frac = to_str(&frac).trim_end_matches('0').to_string();
        let zero = int.is_empty() && frac.is_empty();

        let mut s = String::new();
        if value < 0.0 && !zero {
            s.push('-');
        }
        s.push_str(if int.is_empty() { "0" } else { &int });
        if !frac.is_empty() {
            s.push(self.decimal_separator);
            s.push_str(&frac);
        }
        s
    }
}

/// A post-translational or chemical modification attached to a residue.
///
/// Only descriptive: modifications take part in peptide identity, but never
/// in scoring or FDR estimation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Modification {
    pub residue: char,
    /// Monoisotopic mass shift in Da
    pub mass: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub accession: Option<String>,
}

impl Modification {
    pub fn new<S: Into<String>>(residue: char, mass: f64, description: S) -> Self {
        Self {
            residue,
            mass,
            description: description.into(),
            accession: None,
        }
    }

    pub fn with_accession<S: Into<String>>(mut self, accession: S) -> Self {
        self.accession = Some(accession.into());
        self
    }

    /// Mass shift rounded to four decimals, half-up
    pub fn mass_string(&self) -> String {
        MassFormat::default().format(self.mass)
    }
}

impl Display for Modification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_char(self.residue)?;
        f.write_char('[')?;
        if self.mass > 0.0 {
            f.write_char('+')?;
        }
        f.write_str(&self.mass_string())?;
        f.write_char(']')
    }
}
