use serde::{Deserialize, Serialize};

/// A capture device as reported by `/api/interfaces`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Device system name (used for capture operations)
    pub name: String,

    /// Interface description, if the driver provides one
    pub description: String,

    /// Addresses bound to the interface
    pub addresses: Vec<String>,

    /// Whether this is the device currently being captured
    pub active: bool,
}
