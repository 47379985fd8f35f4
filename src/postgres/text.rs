//! Rendering of binary wire values into PostgreSQL's text output format.
//!
//! Rows come back from the server in binary format; the decoder and host expect the same
//! text a `psql` session would print. Types without a client-side rendering here are cast
//! to text by the server (see [`renders`]).

use std::error::Error;
use std::fmt::Write as _;
use std::io;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::Serialize;
use serde_json::Value;
use serde_json::ser::Formatter;
use tokio_postgres::types::{FromSql, Kind, Type};

type BoxError = Box<dyn Error + Sync + Send>;

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// One result cell rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCell(pub Vec<u8>);

impl TextCell {
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl<'a> FromSql<'a> for TextCell {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        render(ty, raw).map(TextCell)
    }

    fn accepts(ty: &Type) -> bool {
        renders(ty)
    }
}

/// Types whose binary form is already their text form.
fn is_textual(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::JSON | Type::XML | Type::UNKNOWN
    ) || matches!(ty.kind(), Kind::Enum(_))
}

/// Whether [`render`] can produce text for `ty` on the client.
#[must_use]
pub fn renders(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::BOOL
            | Type::INT2
            | Type::INT4
            | Type::INT8
            | Type::OID
            | Type::FLOAT4
            | Type::FLOAT8
            | Type::NUMERIC
            | Type::DATE
            | Type::TIME
            | Type::TIMETZ
            | Type::TIMESTAMP
            | Type::TIMESTAMPTZ
            | Type::UUID
            | Type::BYTEA
            | Type::JSONB
    ) || is_textual(ty)
}

/// Render one non-null binary value of type `ty`.
///
/// # Errors
/// Returns an error when `raw` is malformed for `ty` or `ty` is not one of [`renders`].
pub fn render(ty: &Type, raw: &[u8]) -> Result<Vec<u8>, BoxError> {
    let text = match *ty {
        Type::BOOL => {
            if bool::from_sql(ty, raw)? {
                "t".to_string()
            } else {
                "f".to_string()
            }
        }
        Type::INT2 => i16::from_sql(ty, raw)?.to_string(),
        Type::INT4 => i32::from_sql(ty, raw)?.to_string(),
        Type::INT8 => i64::from_sql(ty, raw)?.to_string(),
        Type::OID => u32::from_sql(ty, raw)?.to_string(),
        Type::FLOAT4 => {
            let value = f32::from_sql(ty, raw)?;
            if value.is_finite() {
                value.to_string()
            } else {
                float(f64::from(value))
            }
        }
        Type::FLOAT8 => float(f64::from_sql(ty, raw)?),
        Type::NUMERIC => numeric(raw)?,
        Type::DATE => match infinity(raw, &i32::MAX.to_be_bytes(), &i32::MIN.to_be_bytes()) {
            Some(text) => text,
            None => NaiveDate::from_sql(ty, raw)?.to_string(),
        },
        Type::TIME => clock(NaiveTime::from_sql(ty, raw)?),
        Type::TIMETZ => timetz(raw)?,
        Type::TIMESTAMP => match infinity(raw, &i64::MAX.to_be_bytes(), &i64::MIN.to_be_bytes()) {
            Some(text) => text,
            None => timestamp(NaiveDateTime::from_sql(ty, raw)?),
        },
        Type::TIMESTAMPTZ => match infinity(raw, &i64::MAX.to_be_bytes(), &i64::MIN.to_be_bytes()) {
            Some(text) => text,
            None => {
                let at = DateTime::<Utc>::from_sql(ty, raw)?;
                format!("{}+00", timestamp(at.naive_utc()))
            }
        },
        Type::UUID => uuid(raw)?,
        Type::BYTEA => {
            let mut text = String::with_capacity(2 + raw.len() * 2);
            text.push_str("\\x");
            for b in raw {
                let _ = write!(text, "{b:02x}");
            }
            text
        }
        Type::JSONB => return jsonb(&Value::from_sql(ty, raw)?),
        _ if is_textual(ty) => return Ok(raw.to_vec()),
        _ => return Err(format!("no client-side text form for type {ty}").into()),
    };
    Ok(text.into_bytes())
}

fn infinity(raw: &[u8], max: &[u8], min: &[u8]) -> Option<String> {
    if raw == max {
        Some("infinity".to_string())
    } else if raw == min {
        Some("-infinity".to_string())
    } else {
        None
    }
}

fn float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else {
        value.to_string()
    }
}

/// `HH:MM:SS` with trailing zeros of the microsecond fraction dropped.
fn clock(time: NaiveTime) -> String {
    let mut text = time.format("%H:%M:%S").to_string();
    let micros = time.nanosecond() / 1_000;
    if micros != 0 {
        let digits = format!("{micros:06}");
        text.push('.');
        text.push_str(digits.trim_end_matches('0'));
    }
    text
}

fn timestamp(at: NaiveDateTime) -> String {
    format!("{} {}", at.date(), clock(at.time()))
}

fn timetz(raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() != 12 {
        return Err("invalid timetz value".into());
    }
    let time = NaiveTime::from_sql(&Type::TIME, &raw[..8])?;
    // zone is stored in seconds west of UTC
    let east = i32::from_sql(&Type::INT4, &raw[8..])?.saturating_neg();
    let mut text = clock(time);
    let sign = if east < 0 { '-' } else { '+' };
    let offset = east.unsigned_abs();
    let _ = write!(text, "{sign}{:02}", offset / 3600);
    if offset % 3600 != 0 {
        let _ = write!(text, ":{:02}", offset / 60 % 60);
        if offset % 60 != 0 {
            let _ = write!(text, ":{:02}", offset % 60);
        }
    }
    Ok(text)
}

/// Separators as in the server's `jsonb` output: `{"a": 1, "b": [1, 2]}`.
struct JsonbFormatter;

impl Formatter for JsonbFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

fn jsonb(value: &Value) -> Result<Vec<u8>, BoxError> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, JsonbFormatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

fn uuid(raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() != 16 {
        return Err("invalid uuid value".into());
    }
    let mut text = String::with_capacity(36);
    for (i, b) in raw.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            text.push('-');
        }
        let _ = write!(text, "{b:02x}");
    }
    Ok(text)
}

fn numeric(raw: &[u8]) -> Result<String, BoxError> {
    let word = |i: usize| -> Result<u16, BoxError> {
        raw.get(i * 2..i * 2 + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| "truncated numeric value".into())
    };
    let ndigits = usize::from(word(0)?);
    let weight = i64::from(i16::from_be_bytes(word(1)?.to_be_bytes()));
    let sign = word(2)?;
    let dscale = usize::from(word(3)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        _ => {}
    }
    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Result<Vec<u16>, BoxError>>()?;
    let digit = |d: i64| -> u16 {
        usize::try_from(d)
            .ok()
            .and_then(|d| digits.get(d).copied())
            .unwrap_or(0)
    };

    let mut text = String::new();
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        for d in 0..=weight {
            if d == 0 {
                let _ = write!(text, "{}", digit(d));
            } else {
                let _ = write!(text, "{:04}", digit(d));
            }
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut d = weight + 1;
        while fraction.len() < dscale {
            let _ = write!(fraction, "{:04}", digit(d));
            d += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}
