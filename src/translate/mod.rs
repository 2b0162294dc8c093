//! Translation of raw backend failures into [`SemanticError`]s.
//!
//! Classification looks at the vendor code first and falls back to the
//! SQLSTATE class, so a backend that reports either (or both) is covered.
//! The mapping is total: anything unrecognized becomes
//! [`ErrorKind::Unknown`] with the raw error kept as the cause.

mod error;

pub use error::{ErrorKind, SemanticError};

use crate::connection::RawError;

// SQLite primary result codes. Extended codes carry the primary code in
// their low byte.
const SQLITE_ERROR: i32 = 1;
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_INTERRUPT: i32 = 9;
const SQLITE_IOERR: i32 = 10;
const SQLITE_FULL: i32 = 13;
const SQLITE_CANTOPEN: i32 = 14;
const SQLITE_PROTOCOL: i32 = 15;
const SQLITE_TOOBIG: i32 = 18;
const SQLITE_CONSTRAINT: i32 = 19;
const SQLITE_MISMATCH: i32 = 20;
const SQLITE_MISUSE: i32 = 21;
const SQLITE_RANGE: i32 = 25;

/// Translate a backend failure raised by `operation` running `statement`.
pub fn translate(operation: &str, statement: &str, raw: RawError) -> SemanticError {
    let kind = classify(&raw);
    log::debug!("{operation}: {raw} classified as {kind}");
    SemanticError::new(kind, operation, statement).with_cause(raw)
}

/// The semantic kind of a raw error.
pub fn classify(raw: &RawError) -> ErrorKind {
    raw.code()
        .and_then(classify_vendor_code)
        .or_else(|| raw.sqlstate().and_then(classify_sqlstate))
        .unwrap_or(ErrorKind::Unknown)
}

fn classify_vendor_code(code: i32) -> Option<ErrorKind> {
    match code & 0xff {
        SQLITE_CONSTRAINT => Some(ErrorKind::Conflict),
        SQLITE_BUSY | SQLITE_LOCKED | SQLITE_INTERRUPT | SQLITE_IOERR | SQLITE_FULL
        | SQLITE_CANTOPEN | SQLITE_PROTOCOL => Some(ErrorKind::Unavailable),
        SQLITE_ERROR | SQLITE_TOOBIG | SQLITE_MISMATCH | SQLITE_MISUSE | SQLITE_RANGE => {
            Some(ErrorKind::InvalidRequest)
        }
        _ => None,
    }
}

fn classify_sqlstate(state: &str) -> Option<ErrorKind> {
    // Exact states first: some classes mix kinds.
    match state {
        "40001" => return Some(ErrorKind::Conflict),
        "HYT00" | "HYT01" => return Some(ErrorKind::Unavailable),
        _ => {}
    }

    match state.get(..2)? {
        "23" => Some(ErrorKind::Conflict),
        "08" | "53" | "57" => Some(ErrorKind::Unavailable),
        "07" | "22" | "42" => Some(ErrorKind::InvalidRequest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(raw: RawError) -> ErrorKind {
        translate("op", "stmt", raw).kind()
    }

    #[test]
    fn test_sqlite_codes() {
        // SQLITE_CONSTRAINT_UNIQUE, SQLITE_CONSTRAINT_PRIMARYKEY, SQLITE_CONSTRAINT_NOTNULL
        for code in [2067, 1555, 1299, SQLITE_CONSTRAINT] {
            assert_eq!(kind_of(RawError::with_code(code, "constraint")), ErrorKind::Conflict);
        }
        // SQLITE_BUSY, SQLITE_LOCKED, SQLITE_IOERR_READ, SQLITE_CANTOPEN
        for code in [5, 6, 266, 14] {
            assert_eq!(kind_of(RawError::with_code(code, "busy")), ErrorKind::Unavailable);
        }
        assert_eq!(
            kind_of(RawError::with_code(SQLITE_ERROR, "near \"selec\": syntax error")),
            ErrorKind::InvalidRequest
        );
    }

    #[test]
    fn test_sqlstate_classes() {
        let cases = [
            ("23505", ErrorKind::Conflict),
            ("40001", ErrorKind::Conflict),
            ("08006", ErrorKind::Unavailable),
            ("57014", ErrorKind::Unavailable),
            ("HYT00", ErrorKind::Unavailable),
            ("42601", ErrorKind::InvalidRequest),
            ("22003", ErrorKind::InvalidRequest),
            ("07000", ErrorKind::InvalidRequest),
            ("0A000", ErrorKind::Unknown),
        ];
        for (state, expected) in cases {
            assert_eq!(
                kind_of(RawError::with_sqlstate(state, "x")),
                expected,
                "sqlstate {state}"
            );
        }
    }

    #[test]
    fn test_vendor_code_wins_over_sqlstate_when_recognized() {
        let raw = RawError::with_code(SQLITE_BUSY, "busy");
        assert_eq!(classify(&raw), ErrorKind::Unavailable);

        // An unrecognized vendor code defers to nothing else here.
        assert_eq!(classify(&RawError::with_code(26, "not a database")), ErrorKind::Unknown);
    }

    #[test]
    fn test_unrecognized_inputs_become_unknown() {
        let inputs = [
            RawError::new("driver exploded"),
            RawError::with_code(-1, "synthetic"),
            RawError::with_code(i32::MAX, "synthetic"),
            RawError::with_sqlstate("", "empty state"),
            RawError::with_sqlstate("9", "short state"),
            RawError::with_sqlstate("ZZZZZ", "synthetic"),
        ];
        for raw in inputs {
            let err = translate("save", "insert into member ...", raw.clone());
            assert_eq!(err.kind(), ErrorKind::Unknown);
            assert_eq!(err.raw(), Some(&raw));
            assert_eq!(err.operation(), "save");
        }
    }

    #[test]
    fn test_translation_keeps_context() {
        let raw = RawError::with_code(2067, "UNIQUE constraint failed: member.member_id");
        let err = translate("save", "insert into member(member_id, money) values (?1, ?2)", raw);

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.operation(), "save");
        assert!(err.statement().starts_with("insert into member"));
        assert_eq!(err.raw().and_then(RawError::code), Some(2067));
    }

    #[test]
    fn test_real_sqlite_failures() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY)").unwrap();

        let syntax = conn.execute("SELEC 1", []).unwrap_err();
        assert_eq!(classify(&syntax.into()), ErrorKind::InvalidRequest);

        let missing = conn.execute("INSERT INTO nope VALUES (1)", []).unwrap_err();
        assert_eq!(classify(&missing.into()), ErrorKind::InvalidRequest);

        conn.execute("INSERT INTO t VALUES ('a')", []).unwrap();
        let dup = conn.execute("INSERT INTO t VALUES ('a')", []).unwrap_err();
        assert_eq!(classify(&dup.into()), ErrorKind::Conflict);
    }
}
