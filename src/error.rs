use thiserror::Error;

/// Errors raised by the data model and its persistence layer.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("{0} does not exist")]
    NotFound(String),
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

pub type ModelResult<T> = Result<T, ModelError>;

impl ModelError {
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

// Postgres reports uniqueness, check, foreign-key and over-long value
// failures with these SQLSTATEs.
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const STRING_DATA_RIGHT_TRUNCATION: &str = "22001";

fn is_constraint_code(code: Option<&str>) -> bool {
    matches!(
        code,
        Some(UNIQUE_VIOLATION | CHECK_VIOLATION | FOREIGN_KEY_VIOLATION | STRING_DATA_RIGHT_TRUNCATION)
    )
}

impl From<sqlx::Error> for ModelError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if is_constraint_code(db.code().as_deref()) {
                return Self::ConstraintViolation(db.message().to_string());
            }
        }
        Self::Database(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_stay_database_errors() {
        let err: ModelError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ModelError::Database(_)));
    }

    #[test]
    fn integrity_codes_are_constraint_violations() {
        for code in ["23505", "23514", "23503", "22001"] {
            assert!(is_constraint_code(Some(code)), "{code}");
        }
        assert!(!is_constraint_code(Some("40001")));
        assert!(!is_constraint_code(Some("42P01")));
        assert!(!is_constraint_code(None));
    }

    #[test]
    fn messages_name_the_problem() {
        let err = ModelError::not_found("Survey 7 of Study 2");
        assert_eq!(err.to_string(), "Survey 7 of Study 2 does not exist");
        let err = ModelError::constraint("username taken");
        assert!(err.to_string().contains("username taken"));
    }
}
