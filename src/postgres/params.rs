use std::error::Error;

use tokio_postgres::types::{Format, FromSql, IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

/// A positional parameter sent in text format; the server infers its type.
#[derive(Debug, Clone, Copy)]
pub struct TextParam<'a>(pub Option<&'a [u8]>);

impl ToSql for TextParam<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.0 {
            Some(value) => {
                out.extend_from_slice(value);
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// A value carried in its binary wire form, whatever its type.
///
/// Read from a result row and sent back as a parameter, it lets the server cast a value the
/// client cannot render to `text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireValue<'a>(pub &'a [u8]);

impl<'a> FromSql<'a> for WireValue<'a> {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(WireValue(raw))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

impl ToSql for WireValue<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        out.extend_from_slice(self.0);
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Borrow protocol parameters as text-format values.
#[must_use]
pub fn text_params<'a>(params: &[Option<&'a [u8]>]) -> Vec<TextParam<'a>> {
    params.iter().copied().map(TextParam).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_are_written_verbatim() {
        let mut out = bytes::BytesMut::new();
        let param = TextParam(Some(&b"42"[..]));
        assert!(matches!(param.to_sql(&Type::INT4, &mut out), Ok(IsNull::No)));
        assert_eq!(&out[..], b"42");
        assert!(matches!(param.encode_format(&Type::INT4), Format::Text));
    }

    #[test]
    fn wire_values_pass_through_unchanged() {
        let raw = [0u8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0];
        let value = WireValue::from_sql(&Type::INTERVAL, &raw).unwrap();
        assert_eq!(value.0, &raw[..]);

        let mut out = bytes::BytesMut::new();
        assert!(matches!(value.to_sql(&Type::INTERVAL, &mut out), Ok(IsNull::No)));
        assert_eq!(&out[..], &raw[..]);
        assert!(matches!(value.encode_format(&Type::INTERVAL), Format::Binary));
    }

    #[test]
    fn missing_values_are_null() {
        let mut out = bytes::BytesMut::new();
        assert!(matches!(
            TextParam(None).to_sql(&Type::TEXT, &mut out),
            Ok(IsNull::Yes)
        ));
        assert!(out.is_empty());
        assert_eq!(text_params(&[None, Some(&b"x"[..])]).len(), 2);
    }
}
