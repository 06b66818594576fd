use serde::{Deserialize, Serialize};

/// Catalog entry backing the prescription form dropdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drug {
    pub id: i64,
    pub name: String,
    pub generic_name: Option<String>,
}
