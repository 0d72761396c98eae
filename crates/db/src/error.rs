use vigil_core::types::DbId;

/// Error type for report persistence.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Report {0} not found")]
    NotFound(DbId),

    #[error("Stored report {id} could not be decoded: {reason}")]
    Decode { id: DbId, reason: String },

    #[error("Report serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_decode() {
        let err = StoreError::Decode {
            id: 4,
            reason: "unknown status id 9".into(),
        };
        assert_eq!(
            err.to_string(),
            "Stored report 4 could not be decoded: unknown status id 9"
        );
    }
}
