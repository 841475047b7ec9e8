//! Error kinds for the Memory Store (`spec.md` §4.4, §7 `budget-exceeded`).

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("memory budget exceeded for user '{user_id}': {attempted_total} chars would exceed the {budget} char budget")]
    BudgetExceeded { user_id: String, attempted_total: usize, budget: usize },

    #[error("memory '{memory_id}' not found for user '{user_id}'")]
    NotFound { user_id: String, memory_id: String },

    #[error("memory store error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        MemoryError::Database(err.to_string())
    }
}
