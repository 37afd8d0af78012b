//! Capability descriptors and connection test results

use serde::{Deserialize, Serialize};

/// A single callable tool advertised by a remote server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CapabilityDescriptor {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            name: name.into(),
            description,
        }
    }
}

/// Outcome of a one-shot connection probe.
///
/// On failure `capabilities` is empty and `capability_count` is 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub success: bool,
    pub message: String,
    pub capability_count: usize,
    pub capabilities: Vec<CapabilityDescriptor>,
}

impl TestResult {
    pub fn success(capabilities: Vec<CapabilityDescriptor>) -> Self {
        let count = capabilities.len();
        Self {
            success: true,
            message: format!("Connection successful. Found {} capabilities.", count),
            capability_count: count,
            capabilities,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            capability_count: 0,
            capabilities: Vec::new(),
        }
    }

    /// Names of the discovered capabilities, in discovery order
    pub fn capability_names(&self) -> Vec<String> {
        self.capabilities.iter().map(|c| c.name.clone()).collect()
    }
}
