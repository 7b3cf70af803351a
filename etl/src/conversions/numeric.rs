use bigdecimal::{
    BigDecimal, ParseBigDecimalError,
    num_bigint::{BigInt, BigUint, Sign},
};
use byteorder::{BigEndian, ReadBytesExt};
use std::{fmt, io::Cursor, str::FromStr};
use thiserror::Error;
use tokio_postgres::types::{FromSql, Type};

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Error returned when a string is not a valid Postgres numeric literal.
#[derive(Debug, Error)]
#[error("invalid numeric value `{value}`: {source}")]
pub struct ParseNumericError {
    value: String,
    source: ParseBigDecimalError,
}

/// A Postgres `numeric` value, including the special values Postgres allows.
///
/// Finite values keep their full precision and scale.
#[derive(Debug, Ord, PartialOrd, Eq, PartialEq, Clone)]
pub enum PgNumeric {
    NaN,
    PositiveInfinity,
    NegativeInfinity,
    Value(BigDecimal),
}

impl FromStr for PgNumeric {
    type Err = ParseNumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nan" => return Ok(PgNumeric::NaN),
            "infinity" | "+infinity" => return Ok(PgNumeric::PositiveInfinity),
            "-infinity" => return Ok(PgNumeric::NegativeInfinity),
            _ => {}
        }

        BigDecimal::from_str(s)
            .map(PgNumeric::Value)
            .map_err(|source| ParseNumericError {
                value: s.to_string(),
                source,
            })
    }
}

/// Decodes the binary wire format: digit count, weight, sign, display scale, then base 10000
/// digits.
impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + 'static + Sync + Send>> {
        let mut rdr = Cursor::new(raw);

        let n_digits = rdr.read_u16::<BigEndian>()?;
        let weight = rdr.read_i16::<BigEndian>()?;
        let sign = match rdr.read_u16::<BigEndian>()? {
            NUMERIC_NEG => Sign::Minus,
            NUMERIC_POS => Sign::Plus,
            NUMERIC_NAN => return Ok(PgNumeric::NaN),
            NUMERIC_PINF => return Ok(PgNumeric::PositiveInfinity),
            NUMERIC_NINF => return Ok(PgNumeric::NegativeInfinity),
            v => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("invalid sign {v:#04x}"),
                )
                .into());
            }
        };
        let scale = rdr.read_u16::<BigEndian>()?;

        let mut biguint = BigUint::from(0u32);
        for n in (0..n_digits).rev() {
            let digit = rdr.read_u16::<BigEndian>()?;
            biguint += BigUint::from(digit) * BigUint::from(10_000u32).pow(n as u32);
        }

        // The first digit was accumulated with factor 10_000^(n_digits - 1) but carries
        // 10_000^weight.
        let correction_exp = 4 * (i64::from(weight) - i64::from(n_digits) + 1);
        let value = BigDecimal::new(BigInt::from_biguint(sign, biguint), -correction_exp)
            .with_scale(i64::from(scale));

        Ok(PgNumeric::Value(value))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::NUMERIC)
    }
}

impl fmt::Display for PgNumeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgNumeric::NaN => write!(f, "NaN"),
            PgNumeric::PositiveInfinity => write!(f, "Infinity"),
            PgNumeric::NegativeInfinity => write!(f, "-Infinity"),
            PgNumeric::Value(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(n_digits: u16, weight: i16, sign: u16, scale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&n_digits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&scale.to_be_bytes());
        for digit in digits {
            raw.extend_from_slice(&digit.to_be_bytes());
        }
        raw
    }

    #[test]
    fn decodes_fractional_value() {
        // 12345.678 is stored as [1, 2345, 6780] with weight 1.
        let raw = encode(3, 1, NUMERIC_POS, 3, &[1, 2345, 6780]);

        let value = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap();

        assert_eq!(value.to_string(), "12345.678");
    }

    #[test]
    fn decodes_negative_value() {
        let raw = encode(1, 0, NUMERIC_NEG, 2, &[42]);

        let value = PgNumeric::from_sql(&Type::NUMERIC, &raw).unwrap();

        assert_eq!(value, "-42.00".parse().unwrap());
    }

    #[test]
    fn decodes_special_values() {
        let nan = PgNumeric::from_sql(&Type::NUMERIC, &encode(0, 0, NUMERIC_NAN, 0, &[])).unwrap();
        let inf = PgNumeric::from_sql(&Type::NUMERIC, &encode(0, 0, NUMERIC_PINF, 0, &[])).unwrap();

        assert_eq!(nan, PgNumeric::NaN);
        assert_eq!(inf, PgNumeric::PositiveInfinity);
    }

    #[test]
    fn rejects_invalid_sign() {
        let raw = encode(0, 0, 0x1234, 0, &[]);

        assert!(PgNumeric::from_sql(&Type::NUMERIC, &raw).is_err());
    }

    #[test]
    fn parses_literals() {
        assert_eq!("-Infinity".parse::<PgNumeric>().unwrap(), PgNumeric::NegativeInfinity);
        assert_eq!("19.99".parse::<PgNumeric>().unwrap().to_string(), "19.99");
        assert!("nineteen".parse::<PgNumeric>().is_err());
    }
}
