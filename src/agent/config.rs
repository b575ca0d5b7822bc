//! Agent configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::crypto::{derive_key, CipherKey, Method};
use crate::error::{Error, Result};

/// Default cipher method.
pub const DEFAULT_METHOD: &str = "aes-256-cfb";

/// Default limit on opening an outbound TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which side of the tunnel this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Speaks SOCKS5 to applications, encrypted protocol to the server
    Local,
    /// Speaks encrypted protocol to local agents, plaintext to destinations
    Server,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Local => f.write_str("local"),
            Role::Server => f.write_str("server"),
        }
    }
}

/// Agent configuration.
#[derive(Clone)]
pub struct AgentConfig {
    /// SOCKS5 listen address (local role only)
    pub local_addr: Option<String>,
    /// Server agent address: dialed by the local role, bound by the server role
    pub server_addr: Option<String>,
    /// Cipher method name; unknown names fall back to aes-256-cfb
    pub method: String,
    /// Shared password
    pub password: String,
    /// Relay idle timeout
    pub timeout: Duration,
    /// Limit on dialing the server agent or a destination
    pub connect_timeout: Duration,
}

impl AgentConfig {
    /// Create a local-role configuration.
    pub fn local(
        local_addr: impl Into<String>,
        server_addr: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            local_addr: Some(local_addr.into()),
            server_addr: Some(server_addr.into()),
            ..Self::default()
        }
        .with_password(password)
    }

    /// Create a server-role configuration.
    pub fn server(server_addr: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            server_addr: Some(server_addr.into()),
            ..Self::default()
        }
        .with_password(password)
    }

    fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Role selected by which addresses are set.
    ///
    /// Both addresses: local. Server address only: server. Anything else is
    /// a usage error.
    pub fn role(&self) -> Result<Role> {
        let set = |addr: &Option<String>| addr.as_deref().map_or(false, |a| !a.is_empty());
        match (set(&self.local_addr), set(&self.server_addr)) {
            (true, true) => Ok(Role::Local),
            (false, true) => Ok(Role::Server),
            _ => Err(Error::config("a server address is required")),
        }
    }

    /// Address this agent listens on.
    pub fn listen_addr(&self) -> Result<&str> {
        let addr = match self.role()? {
            Role::Local => self.local_addr.as_deref(),
            Role::Server => self.server_addr.as_deref(),
        };
        addr.ok_or_else(|| Error::config("no listen address"))
    }

    /// Resolved cipher method.
    pub fn method(&self) -> Method {
        Method::from_name(&self.method)
    }

    /// Derive the tunnel key.
    pub fn key(&self) -> CipherKey {
        derive_key(self.method(), &self.password)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        self.role()?;
        if self.timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(Error::config("timeouts must be positive"));
        }
        Ok(())
    }

    /// Load from a config file: TOML if the extension is `.toml`, JSON otherwise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file: AgentConfigFile = if path.extension().map_or(false, |ext| ext == "toml") {
            toml::from_str(&content).map_err(|e| Error::config(format!("invalid toml: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::config(format!("invalid json: {}", e)))?
        };
        Ok(file.to_config())
    }
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("local_addr", &self.local_addr)
            .field("server_addr", &self.server_addr)
            .field("method", &self.method)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            local_addr: None,
            server_addr: None,
            method: DEFAULT_METHOD.to_string(),
            password: String::new(),
            timeout: crate::proxy::DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Configuration file format.
#[derive(Default, Deserialize)]
pub struct AgentConfigFile {
    /// SOCKS5 listen address
    #[serde(default)]
    pub local_address: Option<String>,
    /// Server agent address
    #[serde(default)]
    pub server_address: Option<String>,
    /// Cipher method
    #[serde(default = "default_method")]
    pub method: String,
    /// Shared password
    #[serde(default)]
    pub password: String,
    /// Relay idle timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    /// Outbound connect timeout (seconds)
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout: u64,
}

fn default_method() -> String {
    DEFAULT_METHOD.to_string()
}

fn default_timeout_secs() -> u64 {
    crate::proxy::DEFAULT_IDLE_TIMEOUT.as_secs()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

impl AgentConfigFile {
    /// Convert to runtime configuration.
    pub fn to_config(&self) -> AgentConfig {
        AgentConfig {
            local_addr: self.local_address.clone(),
            server_addr: self.server_address.clone(),
            method: self.method.clone(),
            password: self.password.clone(),
            timeout: Duration::from_secs(self.timeout),
            connect_timeout: Duration::from_secs(self.connect_timeout),
        }
    }
}
