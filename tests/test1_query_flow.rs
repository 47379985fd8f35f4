use pgsql_lob_driver::backend::{NativeField, NativeResult};
use pgsql_lob_driver::prelude::*;
use pgsql_lob_driver::test_utils::memory::{MemoryBackend, MemoryConnection, MemoryServer};
use pgsql_lob_driver::{ConsumerError, DriverError};

fn connected() -> (MemoryServer, Driver<MemoryBackend>, Session<MemoryConnection>) {
    let server = MemoryServer::new();
    let driver = Driver::new(server.backend());
    let session = driver.connect("user@localhost/test", None).unwrap();
    (server, driver, session)
}

fn int_column(name: &str) -> NativeField {
    NativeField::new(name, oid::INT4)
}

/// Records every callback in order.
#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    fail_on_row: Option<usize>,
    rows: usize,
}

impl QueryEventHandlers for Recorder {
    fn add_column(&mut self, name: &str) -> Result<(), ConsumerError> {
        self.events.push(format!("column {name}"));
        Ok(())
    }

    fn before_rows(&mut self) -> Result<(), ConsumerError> {
        self.events.push("before_rows".to_string());
        Ok(())
    }

    fn add_row(&mut self) -> Result<(), ConsumerError> {
        self.rows += 1;
        if self.fail_on_row == Some(self.rows) {
            return Err(ConsumerError::new("out of memory in host"));
        }
        self.events.push("row".to_string());
        Ok(())
    }

    fn add_row_cell(&mut self, value: Option<&[u8]>) -> Result<(), ConsumerError> {
        let text = value.map_or_else(
            || "NULL".to_string(),
            |v| String::from_utf8_lossy(v).into_owned(),
        );
        self.events.push(format!("cell {text}"));
        Ok(())
    }
}

#[test]
fn select_one_streams_one_cell() {
    let (server, driver, mut session) = connected();
    server.script(
        "SELECT 1 AS a",
        NativeResult::tuples(vec![int_column("a")], vec![vec![Some(b"1".to_vec())]]),
    );

    let mut recorder = Recorder::default();
    driver
        .query(&mut session, "SELECT 1 AS a", &[], 0, NO_LIMIT, &mut recorder)
        .unwrap();
    assert_eq!(
        recorder.events,
        vec!["column a", "before_rows", "row", "cell 1"]
    );
    assert_eq!(server.conninfos(), vec!["postgresql://user@localhost/test".to_string()]);
}

#[test]
fn bad_syntax_fires_no_callbacks() {
    let (_server, driver, mut session) = connected();
    let mut recorder = Recorder::default();
    let err = driver
        .query(&mut session, "bad syntax", &[], 0, NO_LIMIT, &mut recorder)
        .unwrap_err();
    assert!(
        matches!(err, DriverError::StatementError(ref m) if m == "ERROR:  syntax error at or near \"bad\"")
    );
    assert!(recorder.events.is_empty());
}

#[test]
fn empty_statement_is_no_query() {
    let (_server, driver, mut session) = connected();
    let err = driver
        .query(&mut session, "   ", &[], 0, NO_LIMIT, &mut ResultSet::default())
        .unwrap_err();
    assert!(matches!(err, DriverError::StatementError(ref m) if m == "no query"));
}

#[test]
fn command_statements_return_without_columns() {
    let (server, driver, mut session) = connected();
    let mut recorder = Recorder::default();
    driver
        .query(&mut session, "UPDATE t SET a = 1", &[], 0, NO_LIMIT, &mut recorder)
        .unwrap();
    assert!(recorder.events.is_empty());
    assert_eq!(server.executed()[0].sql, "UPDATE t SET a = 1");
}

#[test]
fn window_is_appended_to_executed_text() {
    let (server, driver, mut session) = connected();
    server.script_prefix(
        "SELECT id FROM t",
        NativeResult::tuples(vec![int_column("id")], vec![]),
    );
    let mut results = ResultSet::default();
    driver
        .query(&mut session, "SELECT id FROM t", &[], 5, 10, &mut results)
        .unwrap();
    assert_eq!(server.executed()[0].sql, "SELECT id FROM t limit 10 offset 5");
    assert_eq!(results.column_names(), ["id"]);

    let mut results = ResultSet::default();
    driver
        .query_with_options(
            &mut session,
            "SELECT id FROM t",
            &[],
            &QueryOptions::default().with_offset(2),
            &mut results,
        )
        .unwrap();
    assert_eq!(server.executed()[1].sql, "SELECT id FROM t offset 2");
}

#[test]
fn wide_results_are_capped_at_500_columns() {
    let (server, driver, mut session) = connected();
    let fields: Vec<NativeField> = (0..600).map(|i| int_column(&format!("c{i}"))).collect();
    let row: Vec<Option<Vec<u8>>> = (0..600).map(|i| Some(i.to_string().into_bytes())).collect();
    server.script("SELECT wide", NativeResult::tuples(fields, vec![row]));

    let mut results = ResultSet::default();
    driver
        .query(&mut session, "SELECT wide", &[], 0, NO_LIMIT, &mut results)
        .unwrap();
    assert_eq!(results.column_names().len(), 500);
    assert_eq!(results.rows[0].len(), 500);
    assert_eq!(results.rows[0].get_text("c499").as_deref(), Some("499"));
    assert!(results.rows[0].get("c500").is_none());
}

#[test]
fn consumer_failure_aborts_the_query() {
    let (server, driver, mut session) = connected();
    server.script(
        "SELECT n FROM t",
        NativeResult::tuples(
            vec![int_column("n")],
            vec![
                vec![Some(b"1".to_vec())],
                vec![Some(b"2".to_vec())],
                vec![Some(b"3".to_vec())],
            ],
        ),
    );
    let mut recorder = Recorder {
        fail_on_row: Some(2),
        ..Recorder::default()
    };
    let err = driver
        .query(&mut session, "SELECT n FROM t", &[], 0, NO_LIMIT, &mut recorder)
        .unwrap_err();
    assert!(matches!(err, DriverError::ConsumerError(ref e) if e.message == "out of memory in host"));
    assert_eq!(
        recorder.events,
        vec!["column n", "before_rows", "row", "cell 1"]
    );
}

#[test]
fn zero_column_rows_result_is_rejected() {
    let (server, driver, mut session) = connected();
    server.script("SELECT", NativeResult::tuples(vec![], vec![vec![]]));
    let err = driver
        .query(&mut session, "SELECT", &[], 0, NO_LIMIT, &mut ResultSet::default())
        .unwrap_err();
    assert!(matches!(err, DriverError::StatementError(ref m) if m == "result contains no columns"));
}

#[test]
fn session_lifecycle() {
    let (server, driver, session) = connected();
    assert_eq!(driver.api_version(), API_VERSION);
    assert!(driver.ping(&session));
    assert_eq!(&*driver.quote(&session, b"O'Neil"), b"O''Neil");
    driver.disconnect(session);
    assert_eq!(server.finished_connections(), 1);
}
