use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("syntax error at {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("duplicate field id {field_id} in form class {class_id}")]
    DuplicateField { class_id: String, field_id: String },
}

impl CoreError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }
}
