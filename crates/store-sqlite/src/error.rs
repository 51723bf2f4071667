// Driver Error Classification
//
// Maps sqlx errors into the taxonomy. Driver detail is logged here and never
// reaches the caller. A missing backing table for a live queue means someone
// has modified the storage manually; that is a fatal invariant violation.

use plainq_core::error::Error;
use tracing::error;

// SQLite extended result codes, https://www.sqlite.org/rescode.html
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

/// Logs a fatal invariant violation and aborts the process. These indicate
/// external tampering with the store; recovery is not possible. An abort is
/// used instead of a panic because the runtime catches task panics, which
/// would silently kill the background task and nothing else.
pub(crate) fn fatal(message: String) -> ! {
    error!(message = %message, "fatal storage invariant violation");
    std::process::abort();
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();

            if message.contains("no such table: q_") {
                fatal(format!(
                    "backing message table is missing for an existing queue: {message}"
                ));
            }

            match db_err.code().as_deref() {
                Some(SQLITE_CONSTRAINT_PRIMARYKEY) | Some(SQLITE_CONSTRAINT_UNIQUE) => {
                    Error::AlreadyExists
                }

                code => {
                    error!(code = ?code, message = %message, "database error");
                    Error::Unavailable
                }
            }
        }

        sqlx::Error::RowNotFound => Error::NotFound,

        _ => {
            error!(error = %err, "database driver error");
            Error::Unavailable
        }
    }
}
