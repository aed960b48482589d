pub mod acr;
pub mod error;
pub mod expr;
pub mod field_value;
pub mod form;
pub mod ids;
pub mod resource;

pub use acr::AccessControlRule;
pub use error::CoreError;
pub use field_value::{FieldValue, Record};
pub use form::{FieldType, FormClass, FormElement, FormField};
pub use ids::*;
pub use resource::Resource;
