use rtq_core::default::DEFAULT_FLOW_BUFFER_SIZE;

use crate::session::SessionError;

/// The configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity in bytes of each read flow's buffer. Payloads that don't fit
    /// are dropped.
    pub flow_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flow_buffer_size: DEFAULT_FLOW_BUFFER_SIZE,
        }
    }
}

impl SessionConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_flow_buffer_size(mut self, flow_buffer_size: usize) -> Self {
        self.flow_buffer_size = flow_buffer_size;
        self
    }
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.flow_buffer_size == 0 {
            return Err(SessionError::InvalidConfig(
                "flow_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
