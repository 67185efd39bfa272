//! Typed error taxonomy for RPC and configuration failures.

use std::collections::BTreeMap;
use std::fmt;

/// Structured context carried by every [`RpcError`] variant.
#[derive(Debug, Clone, Default)]
pub struct RpcErrorContext {
    pub blockchain: Option<String>,
    pub rpc_url: Option<String>,
    pub operation: Option<String>,
    pub attempt: Option<u32>,
    pub max_attempts: Option<u32>,
    pub rpc_error_code: Option<i64>,
    pub rpc_error_message: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl RpcErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blockchain(mut self, name: impl Into<String>) -> Self {
        self.blockchain = Some(name.into());
        self
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32, max_attempts: u32) -> Self {
        self.attempt = Some(attempt);
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra.insert(key.into(), value.into());
    }
}

impl fmt::Display for RpcErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(b) = &self.blockchain {
            parts.push(format!("blockchain={b}"));
        }
        if let Some(u) = &self.rpc_url {
            parts.push(format!("rpc_url={u}"));
        }
        if let Some(op) = &self.operation {
            parts.push(format!("operation={op}"));
        }
        if let Some(a) = self.attempt {
            parts.push(format!("attempt={a}"));
        }
        if let Some(m) = self.max_attempts {
            parts.push(format!("max_attempts={m}"));
        }
        for (k, v) in &self.extra {
            parts.push(format!("{k}={v}"));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// The five-variant RPC error taxonomy. Classification happens once, at the
/// first crossing of the RPC boundary (`rpc::execute_with_retries`); every
/// failure that reaches a poll iteration is already one of these.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("timeout: {message} ({context})")]
    Timeout {
        message: String,
        context: RpcErrorContext,
    },

    #[error("connection error: {message} ({context})")]
    Connection {
        message: String,
        context: RpcErrorContext,
    },

    #[error("protocol error: {message} ({context})")]
    Protocol {
        message: String,
        context: RpcErrorContext,
    },

    #[error("validation error: {message} ({context})")]
    Validation {
        message: String,
        context: RpcErrorContext,
    },

    #[error("unknown error: {message} ({context})")]
    Unknown {
        message: String,
        context: RpcErrorContext,
    },
}

impl RpcError {
    pub fn context(&self) -> &RpcErrorContext {
        match self {
            RpcError::Timeout { context, .. }
            | RpcError::Connection { context, .. }
            | RpcError::Protocol { context, .. }
            | RpcError::Validation { context, .. }
            | RpcError::Unknown { context, .. } => context,
        }
    }

    pub fn context_mut(&mut self) -> &mut RpcErrorContext {
        match self {
            RpcError::Timeout { context, .. }
            | RpcError::Connection { context, .. }
            | RpcError::Protocol { context, .. }
            | RpcError::Validation { context, .. }
            | RpcError::Unknown { context, .. } => context,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            RpcError::Timeout { .. } => "timeout",
            RpcError::Connection { .. } => "connection",
            RpcError::Protocol { .. } => "protocol",
            RpcError::Validation { .. } => "validation",
            RpcError::Unknown { .. } => "unknown",
        }
    }

    /// Classify a free-form failure (a transport error or a JSON-RPC error
    /// object) into the tagged taxonomy. Best-effort, string- and type-based.
    pub fn classify(message: impl Into<String>, context: RpcErrorContext) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();

        if lowered.contains("timeout") || lowered.contains("timed out") {
            return RpcError::Timeout { message, context };
        }

        if lowered.contains("connection")
            || lowered.contains("network unreachable")
            || lowered.contains("name resolution")
            || lowered.contains("connection refused")
            || lowered.contains("connection reset")
            || lowered.contains("connection aborted")
        {
            return RpcError::Connection { message, context };
        }

        if lowered.contains("rpc") || context.rpc_error_code.is_some() {
            return RpcError::Protocol { message, context };
        }

        RpcError::Unknown { message, context }
    }

    /// True if this is a Protocol error whose message marks an
    /// over-large `eth_getLogs` response (§4.5 policy hook 1).
    pub fn is_response_too_big(&self) -> bool {
        if let RpcError::Protocol { message, context } = self {
            let msg_lower = message.to_lowercase();
            if msg_lower.contains("too big") || msg_lower.contains("exceeded max limit") {
                return true;
            }
            if let Some(rpc_message) = &context.rpc_error_message {
                let lowered = rpc_message.to_lowercase();
                if lowered.contains("too big") || lowered.contains("exceeded max limit") {
                    return true;
                }
            }
        }
        false
    }

    /// Construct a Validation error directly (reqwest JSON decode failures,
    /// malformed responses, local data-shape problems).
    pub fn validation(message: impl Into<String>, context: RpcErrorContext) -> Self {
        RpcError::Validation {
            message: message.into(),
            context,
        }
    }

    /// Construct a Protocol error carrying a JSON-RPC error object.
    pub fn protocol(
        message: impl Into<String>,
        code: Option<i64>,
        rpc_message: Option<String>,
        mut context: RpcErrorContext,
    ) -> Self {
        context.rpc_error_code = code;
        context.rpc_error_message = rpc_message;
        RpcError::Protocol {
            message: message.into(),
            context,
        }
    }
}

/// Configuration-time errors, carrying the offending TOML path so operators
/// can locate the failing entry without re-parsing the file themselves.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path}")]
    NotFound { path: String },

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("{path}: {message}")]
    Validation { path: String, message: String },
}

impl ConfigError {
    pub fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Validation {
            path: path.into(),
            message: message.into(),
        }
    }
}
