//! Engine configuration.

use serde::Deserialize;

/// Default limit on active call frames.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1024;

/// Settings for one VM.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mirror program output to stdout as it is written
    pub echo_output: bool,
    /// Maximum number of active call frames, including the program frame
    pub max_call_depth: usize,
    /// Emit a trace event per dispatched instruction
    pub trace_instructions: bool,
}

impl Config {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets output echoing.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo_output = echo;
        self
    }

    /// Sets the call depth limit.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Sets per-instruction tracing.
    pub fn with_trace_instructions(mut self, trace: bool) -> Self {
        self.trace_instructions = trace;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            echo_output: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            trace_instructions: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.echo_output);
        assert_eq!(config.max_call_depth, 1024);
    }

    #[test]
    fn test_partial_json() {
        let config: Config = serde_json::from_str(r#"{ "max_call_depth": 8 }"#).unwrap();
        assert_eq!(config, Config::new().with_max_call_depth(8));
    }
}
