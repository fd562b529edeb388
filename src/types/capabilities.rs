//! Provider capabilities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LlmError;

/// A named feature a provider may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Streaming,
    FunctionCalling,
    Vision,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::Streaming,
        Capability::FunctionCalling,
        Capability::Vision,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::FunctionCalling => "function_calling",
            Self::Vision => "vision",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "streaming" => Ok(Self::Streaming),
            "function_calling" | "functionCalling" | "tools" => Ok(Self::FunctionCalling),
            "vision" => Ok(Self::Vision),
            other => Err(LlmError::ConfigurationError(format!(
                "unknown capability '{other}'"
            ))),
        }
    }
}

/// Fixed capability record queried per instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub streaming: bool,
    pub function_calling: bool,
    pub vision: bool,
    pub max_context_length: u32,
    pub supported_formats: Vec<String>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn with_function_calling(mut self) -> Self {
        self.function_calling = true;
        self
    }

    pub fn with_vision(mut self) -> Self {
        self.vision = true;
        self
    }

    pub fn with_max_context_length(mut self, tokens: u32) -> Self {
        self.max_context_length = tokens;
        self
    }

    pub fn with_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_formats = formats.into_iter().map(Into::into).collect();
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Streaming => self.streaming,
            Capability::FunctionCalling => self.function_calling,
            Capability::Vision => self.vision,
        }
    }

    pub fn supports_all(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.supports(*c))
    }

    /// Every capability flag that is set.
    pub fn enabled(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.supports(*c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_all_requires_every_flag() {
        let caps = Capabilities::new().with_streaming().with_vision();
        assert!(caps.supports_all(&[Capability::Vision]));
        assert!(caps.supports_all(&[]));
        assert!(!caps.supports_all(&[Capability::Vision, Capability::FunctionCalling]));
        assert_eq!(
            caps.enabled().collect::<Vec<_>>(),
            vec![Capability::Streaming, Capability::Vision]
        );
    }

    #[test]
    fn parses_capability_names() {
        assert_eq!("vision".parse::<Capability>().unwrap(), Capability::Vision);
        assert_eq!(
            "functionCalling".parse::<Capability>().unwrap(),
            Capability::FunctionCalling
        );
        assert!("telepathy".parse::<Capability>().is_err());
    }
}
