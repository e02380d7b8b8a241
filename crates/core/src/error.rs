use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Reject ids the platform can never have issued.
pub fn ensure_valid_id(entity: &'static str, id: DbId) -> Result<DbId, CoreError> {
    if id <= 0 {
        return Err(CoreError::Validation(format!(
            "{entity} id must be positive, got {id}"
        )));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_ids_pass() {
        assert_eq!(ensure_valid_id("job", 7).unwrap(), 7);
    }

    #[test]
    fn zero_and_negative_ids_fail() {
        assert!(ensure_valid_id("job", 0).is_err());
        assert!(ensure_valid_id("pipeline", -3).is_err());
    }
}
