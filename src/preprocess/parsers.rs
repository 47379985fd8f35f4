pub(super) const ANNOTATION_START: &[u8] = b"/**";
pub(super) const ANNOTATION_END: &[u8] = b"**/'";

/// `/**` opens an annotation unless it is immediately followed by `*/`, as in `/***/`.
pub(super) fn is_annotation_start(bytes: &[u8], idx: usize) -> bool {
    let Some(rest) = bytes.get(idx..) else {
        return false;
    };
    rest.starts_with(ANNOTATION_START) && !rest[3..].starts_with(b"*/")
}

/// `**/` immediately followed by the literal's opening quote.
pub(super) fn is_annotation_end(bytes: &[u8], idx: usize) -> bool {
    bytes
        .get(idx..)
        .is_some_and(|rest| rest.starts_with(ANNOTATION_END))
}

pub(super) fn is_doubled_quote(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'\'') && bytes.get(idx + 1) == Some(&b'\'')
}
