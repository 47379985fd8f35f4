use std::borrow::Cow;

mod parsers;
mod scanner;

use parsers::{
    ANNOTATION_END, ANNOTATION_START, is_annotation_end, is_annotation_start, is_doubled_quote,
};
use scanner::State;

use crate::backend::NativeConnection;
use crate::error::Result;
use crate::large_object::LargeObjectWriter;
use crate::types::{Oid, QueryOptions};

/// A statement ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten<'a> {
    /// Executable text; borrowed when nothing had to change.
    pub sql: Cow<'a, str>,
    /// Large objects created for annotated literals, in statement order.
    pub large_objects: Vec<Oid>,
}

/// Rewrite a raw statement into an executable one.
///
/// Appends the `limit`/`offset` window, then replaces every `/**...**/'literal'` annotation
/// with the identifier of a new large object holding the literal's bytes. The annotation
/// body between the markers is ignored. Inside the literal, `\x` stands for `x` and `''`
/// for `'`.
///
/// ```rust
/// use pgsql_lob_driver::preprocess::preprocess;
/// use pgsql_lob_driver::test_utils::memory::MemoryServer;
/// use pgsql_lob_driver::QueryOptions;
///
/// let server = MemoryServer::new();
/// let mut conn = server.connection();
/// let out = preprocess(
///     &mut conn,
///     "INSERT INTO docs VALUES (/**body**/'hello')",
///     &QueryOptions::default(),
///     4096,
/// )
/// .unwrap();
/// let object = out.large_objects[0];
/// assert_eq!(out.sql, format!("INSERT INTO docs VALUES ({object})"));
/// assert_eq!(server.object(object).unwrap(), b"hello");
/// ```
///
/// # Errors
/// Returns `DriverError::LargeObjectError` if a large object cannot be created, written or
/// closed. Objects created before the failure are left in place.
pub fn preprocess<'a, C: NativeConnection + ?Sized>(
    conn: &mut C,
    statement: &'a str,
    options: &QueryOptions,
    chunk_size: usize,
) -> Result<Rewritten<'a>> {
    let windowed = apply_window(statement, options);
    let (rewritten, large_objects) = rewrite_literals(conn, &windowed, chunk_size)?;
    let sql = match rewritten {
        Some(text) => Cow::Owned(text),
        None => windowed,
    };
    Ok(Rewritten { sql, large_objects })
}

/// Append ` limit N` and ` offset N` clauses, each only when set.
#[must_use]
pub fn apply_window<'a>(sql: &'a str, options: &QueryOptions) -> Cow<'a, str> {
    if !options.is_windowed() {
        return Cow::Borrowed(sql);
    }
    let mut text = String::with_capacity(sql.len() + 48);
    text.push_str(sql);
    if let Some(limit) = options.limit {
        text.push_str(&format!(" limit {limit}"));
    }
    if options.offset != 0 {
        text.push_str(&format!(" offset {}", options.offset));
    }
    Cow::Owned(text)
}

fn rewrite_literals<C: NativeConnection + ?Sized>(
    conn: &mut C,
    sql: &str,
    chunk_size: usize,
) -> Result<(Option<String>, Vec<Oid>)> {
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut objects = Vec::new();
    // sql[copied..idx] is verbatim text not yet pushed to `out`
    let mut copied = 0;
    let mut state = State::Copying;
    let mut idx = 0;

    loop {
        match state {
            State::Copying => {
                if idx >= bytes.len() {
                    break;
                }
                if is_annotation_start(bytes, idx) {
                    state = State::InAnnotationBody { marker: idx };
                    idx += ANNOTATION_START.len();
                } else {
                    idx += 1;
                }
            }
            State::InAnnotationBody { marker } => {
                if idx >= bytes.len() {
                    // No end marker anywhere past `marker`, so no later start marker can
                    // match either: the rest of the text stays verbatim.
                    break;
                }
                if is_annotation_end(bytes, idx) {
                    out.get_or_insert_with(|| String::with_capacity(sql.len()))
                        .push_str(&sql[copied..marker]);
                    idx += ANNOTATION_END.len();
                    state = State::InLiteralAfterAnnotation;
                } else {
                    idx += 1;
                }
            }
            State::InLiteralAfterAnnotation => {
                let (object, next) = upload_literal(conn, bytes, idx, chunk_size)?;
                if let Some(buf) = out.as_mut() {
                    buf.push_str(&object.to_string());
                }
                objects.push(object);
                idx = next;
                copied = next;
                state = State::Copying;
            }
        }
    }

    let out = out.map(|mut buf| {
        buf.push_str(&sql[copied..]);
        buf
    });
    Ok((out, objects))
}

/// Upload the literal starting at `start` (just past its opening quote).
///
/// Returns the new object and the index just past the closing quote. A literal running to
/// end-of-text is uploaded as is.
fn upload_literal<C: NativeConnection + ?Sized>(
    conn: &mut C,
    bytes: &[u8],
    start: usize,
    chunk_size: usize,
) -> Result<(Oid, usize)> {
    let mut writer = LargeObjectWriter::create(conn, chunk_size)?;
    match copy_literal(&mut writer, bytes, start) {
        Ok(next) => Ok((writer.finish()?, next)),
        Err(err) => {
            writer.abandon();
            Err(err)
        }
    }
}

fn copy_literal<C: NativeConnection + ?Sized>(
    writer: &mut LargeObjectWriter<'_, C>,
    bytes: &[u8],
    start: usize,
) -> Result<usize> {
    // bytes[run..idx] is unescaped literal content not yet written
    let mut run = start;
    let mut idx = start;
    while idx < bytes.len() {
        if bytes[idx] == b'\\' || is_doubled_quote(bytes, idx) {
            writer.write(&bytes[run..idx])?;
            run = idx + 1;
            idx += 2;
        } else if bytes[idx] == b'\'' {
            writer.write(&bytes[run..idx])?;
            return Ok(idx + 1);
        } else {
            idx += 1;
        }
    }
    writer.write(&bytes[run..])?;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriverError;
    use crate::test_utils::memory::MemoryServer;

    fn run(server: &MemoryServer, sql: &str, options: QueryOptions) -> Rewritten<'static> {
        let mut conn = server.connection();
        let out = preprocess(&mut conn, sql, &options, 4096).expect("preprocess");
        Rewritten {
            sql: Cow::Owned(out.sql.into_owned()),
            large_objects: out.large_objects,
        }
    }

    #[test]
    fn appends_limit_before_offset() {
        let server = MemoryServer::new();
        let out = run(
            &server,
            "SELECT 1",
            QueryOptions::default().with_offset(5).with_limit(10),
        );
        assert_eq!(out.sql, "SELECT 1 limit 10 offset 5");
    }

    #[test]
    fn window_clauses_are_independent() {
        let only_offset = apply_window("SELECT 1", &QueryOptions::default().with_offset(3));
        assert_eq!(only_offset, "SELECT 1 offset 3");
        let only_limit = apply_window("SELECT 1", &QueryOptions::from_window(0, 7));
        assert_eq!(only_limit, "SELECT 1 limit 7");
        let zero_limit = apply_window("SELECT 1", &QueryOptions::default().with_limit(0));
        assert_eq!(zero_limit, "SELECT 1 limit 0");
    }

    #[test]
    fn plain_statement_is_borrowed_untouched() {
        let server = MemoryServer::new();
        let mut conn = server.connection();
        let sql = "SELECT a /* comment */ FROM t WHERE b = 'x''y'";
        let out = preprocess(&mut conn, sql, &QueryOptions::from_window(0, crate::NO_LIMIT), 4096)
            .unwrap();
        assert!(matches!(out.sql, Cow::Borrowed(_)));
        assert_eq!(out.sql, sql);
        assert!(out.large_objects.is_empty());
        assert!(server.lo_calls().is_empty());
    }

    #[test]
    fn annotated_literal_becomes_object_identifier() {
        let server = MemoryServer::new();
        let out = run(
            &server,
            "INSERT INTO t VALUES (/**x**/'AB')",
            QueryOptions::default(),
        );
        assert_eq!(out.large_objects.len(), 1);
        let object = out.large_objects[0];
        assert_eq!(out.sql, format!("INSERT INTO t VALUES ({object})"));
        assert_eq!(server.object(object).unwrap(), b"AB");
    }

    #[test]
    fn escapes_are_removed_from_uploaded_bytes() {
        let server = MemoryServer::new();
        let out = run(
            &server,
            r"UPDATE t SET v = /**v**/'it''s a \\ path \' q' WHERE id = 1",
            QueryOptions::default(),
        );
        let object = out.large_objects[0];
        assert_eq!(out.sql, format!("UPDATE t SET v = {object} WHERE id = 1"));
        assert_eq!(server.object(object).unwrap(), br"it's a \ path ' q");
    }

    #[test]
    fn unmatched_marker_is_left_verbatim() {
        let server = MemoryServer::new();
        let sql = "SELECT '/** no end' AS a, '**/ x' AS b";
        let out = run(&server, sql, QueryOptions::default());
        assert_eq!(out.sql, sql);
        assert!(out.large_objects.is_empty());
        assert_eq!(server.object_count(), 0);
        assert!(server.lo_calls().is_empty());
    }

    #[test]
    fn zero_chunk_size_fails_the_upload() {
        let server = MemoryServer::new();
        let mut conn = server.connection();
        let err = preprocess(&mut conn, "VALUES (/**b**/'abc')", &QueryOptions::default(), 0)
            .unwrap_err();
        assert!(matches!(err, DriverError::LargeObjectError(_)));
        assert_eq!(server.object_count(), 0);
    }

    #[test]
    fn empty_comment_opens_an_annotation() {
        let server = MemoryServer::new();
        let out = run(&server, "SELECT /**/ 1, /**x**/'A'", QueryOptions::default());
        assert_eq!(out.large_objects.len(), 1);
        let object = out.large_objects[0];
        assert_eq!(out.sql, format!("SELECT {object}"));
        assert_eq!(server.object(object).unwrap(), b"A");
    }

    #[test]
    fn star_slash_after_marker_is_a_plain_comment() {
        let server = MemoryServer::new();
        let out = run(&server, "SELECT 1 /***/, /**x**/'z'", QueryOptions::default());
        let object = out.large_objects[0];
        assert_eq!(out.sql, format!("SELECT 1 /***/, {object}"));
        assert_eq!(server.object(object).unwrap(), b"z");
    }

    #[test]
    fn body_may_contain_end_marker_without_quote() {
        let server = MemoryServer::new();
        let out = run(&server, "VALUES (/**a**/b**/'c')", QueryOptions::default());
        let object = out.large_objects[0];
        assert_eq!(out.sql, format!("VALUES ({object})"));
        assert_eq!(server.object(object).unwrap(), b"c");
    }

    #[test]
    fn each_annotation_gets_its_own_object() {
        let server = MemoryServer::new();
        let out = run(
            &server,
            "INSERT INTO t VALUES (/**a**/'one', /**b**/'two') ",
            QueryOptions::default().with_limit(1),
        );
        let [first, second] = out.large_objects[..] else {
            panic!("expected two objects, got {:?}", out.large_objects);
        };
        assert_ne!(first, second);
        assert_eq!(
            out.sql,
            format!("INSERT INTO t VALUES ({first}, {second})  limit 1")
        );
        assert_eq!(server.object(first).unwrap(), b"one");
        assert_eq!(server.object(second).unwrap(), b"two");
    }

    #[test]
    fn unterminated_literal_runs_to_end_of_text() {
        let server = MemoryServer::new();
        let out = run(&server, "SELECT /**a**/'abc", QueryOptions::default());
        let object = out.large_objects[0];
        assert_eq!(out.sql, format!("SELECT {object}"));
        assert_eq!(server.object(object).unwrap(), b"abc");

        let out = run(&server, "SELECT /**a**/'", QueryOptions::default());
        let object = out.large_objects[0];
        assert_eq!(out.sql, format!("SELECT {object}"));
        assert_eq!(server.object(object).unwrap(), b"");
    }

    #[test]
    fn non_ascii_text_survives_rewrite() {
        let server = MemoryServer::new();
        let out = run(
            &server,
            "SELECT 'привет', /**x**/'é' AS v",
            QueryOptions::default(),
        );
        let object = out.large_objects[0];
        assert_eq!(out.sql, format!("SELECT 'привет', {object} AS v"));
        assert_eq!(server.object(object).unwrap(), "é".as_bytes());
    }

    #[test]
    fn large_literal_is_written_in_chunks() {
        let server = MemoryServer::new();
        let payload = "z".repeat(10_000);
        let sql = format!("INSERT INTO t VALUES (/**big**/'{payload}')");
        let out = run(&server, &sql, QueryOptions::default());
        let object = out.large_objects[0];
        assert_eq!(server.object(object).unwrap(), payload.as_bytes());
        assert!(server.max_transfer() <= 4096);
    }

    #[test]
    fn creation_failure_aborts_preprocessing() {
        let server = MemoryServer::new();
        server.fail_large_object_creation("ERROR:  permission denied for large object");
        let mut conn = server.connection();
        let err = preprocess(
            &mut conn,
            "INSERT INTO t VALUES (/**x**/'AB')",
            &QueryOptions::default(),
            4096,
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::LargeObjectError(ref m) if m.contains("permission denied")));
        assert_eq!(server.object_count(), 0);
    }
}
