use std::time::Duration;

use clap::Args;
use transmission_rpc::{
    Credentials, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_RPC_PATH, Endpoint, EndpointError, RpcClient,
};

/// Where the daemon lives and how to authenticate against it.
#[derive(Args, Clone)]
pub struct DaemonArgs {
    /// Transmission daemon host
    #[arg(long, env = "TRANSMISSION_HOST", default_value = DEFAULT_HOST)]
    pub host: String,
    /// Transmission RPC port
    #[arg(long, env = "TRANSMISSION_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// RPC path on the daemon
    #[arg(long, env = "TRANSMISSION_RPC_PATH", default_value = DEFAULT_RPC_PATH)]
    pub rpc_path: String,
    /// http or https
    #[arg(long, env = "TRANSMISSION_SCHEME", default_value = "http")]
    pub scheme: String,
    /// Basic auth username (used only together with a password)
    #[arg(long, env = "TRANSMISSION_USERNAME")]
    pub username: Option<String>,
    /// Basic auth password
    #[arg(long, env = "TRANSMISSION_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Per-request timeout in seconds
    #[arg(long, env = "TRANSMISSION_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl Default for DaemonArgs {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            scheme: "http".to_string(),
            username: None,
            password: None,
            timeout_secs: 30,
        }
    }
}

impl DaemonArgs {
    pub fn endpoint(&self) -> Result<Endpoint, EndpointError> {
        Endpoint::new(&self.scheme, &self.host, self.port, &self.rpc_path)
    }

    pub fn credentials(&self) -> Option<Credentials> {
        let username = self.username.clone().filter(|u| !u.is_empty());
        let password = self.password.clone().filter(|p| !p.is_empty());
        if username.is_some() != password.is_some() {
            tracing::warn!(
                "TRANSMISSION_USERNAME and TRANSMISSION_PASSWORD must both be set; \
                 sending requests without basic auth"
            );
        }
        Credentials::from_parts(username, password)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn build_client(&self) -> Result<RpcClient, EndpointError> {
        Ok(RpcClient::new(self.endpoint()?, self.credentials()).with_timeout(self.timeout()))
    }
}
