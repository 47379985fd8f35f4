//! Positional parameter binding.

use crate::error::{DriverError, Result};
use crate::types::Placeholder;

const BAD_KEY: &str = "bad bind parameter key";

/// Reorder placeholders into a dense parameter array indexed by position.
///
/// Each name must parse as an integer `k` with `1 <= k <= placeholders.len()`; the value is
/// stored at `k - 1`. A later placeholder for the same position overwrites an earlier one.
/// Positions nobody supplied stay `None` and go to the server as NULL.
///
/// # Errors
/// Returns `DriverError::BindingError` for the whole call if any key is invalid.
pub fn bind_parameters(placeholders: &[Placeholder]) -> Result<Vec<Option<&[u8]>>> {
    let count = placeholders.len();
    let mut params: Vec<Option<&[u8]>> = vec![None; count];
    for placeholder in placeholders {
        let position = parse_key(&placeholder.name, count)?;
        params[position - 1] = placeholder.value.as_deref();
    }
    Ok(params)
}

fn parse_key(name: &str, count: usize) -> Result<usize> {
    match name.trim().parse::<usize>() {
        Ok(k) if (1..=count).contains(&k) => Ok(k),
        _ => {
            tracing::debug!(key = name, count, "rejecting placeholder");
            Err(DriverError::BindingError(BAD_KEY.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorders_by_position() {
        let placeholders = vec![
            Placeholder::new("2", "b"),
            Placeholder::null("3"),
            Placeholder::new("1", "a"),
        ];
        let params = bind_parameters(&placeholders).unwrap();
        assert_eq!(params, vec![Some(&b"a"[..]), Some(&b"b"[..]), None]);
    }

    #[test]
    fn unsupplied_positions_stay_null() {
        let placeholders = vec![Placeholder::new("2", "x"), Placeholder::new("2", "y")];
        let params = bind_parameters(&placeholders).unwrap();
        assert_eq!(params, vec![None, Some(&b"y"[..])]);
    }

    #[test]
    fn any_bad_key_aborts_the_bind() {
        for bad in ["0", "3", "-1", "one", "", "1.5"] {
            let placeholders = vec![Placeholder::new("1", "ok"), Placeholder::new(bad, "v")];
            let err = bind_parameters(&placeholders).unwrap_err();
            assert!(
                matches!(err, DriverError::BindingError(ref m) if m == "bad bind parameter key"),
                "key {bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn empty_set_binds_nothing() {
        assert!(bind_parameters(&[]).unwrap().is_empty());
    }
}
