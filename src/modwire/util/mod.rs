pub use self::errors::{ClassNotFoundError, InvalidFilterError, ResourceNotFoundError};

pub mod errors;
