use std::time::Duration;

/// Default Gearman job server port.
pub const DEFAULT_PORT: u16 = 4730;

/// Client-side configuration for talking to a pool of job servers.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Job server addresses in host:port format, supports both IP and hostnames
    pub servers: Vec<String>,
    /// Upper bound for opening a TCP connection to a job server
    pub connect_timeout_ms: u64,
    /// How long a submission waits for the server to assign a handle
    pub handle_timeout_ms: u64,
    /// How long a server marked bad is skipped before it is tried again
    pub bad_server_retry_ms: u64,
    /// Largest packet payload accepted from a server
    pub max_packet_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            connect_timeout_ms: 1_000,
            handle_timeout_ms: 5_000,
            bad_server_retry_ms: 30_000,
            max_packet_size: 64 * 1024 * 1024,
        }
    }
}

impl ClientConfig {
    pub fn new(servers: Vec<String>) -> Self {
        Self {
            servers,
            ..Default::default()
        }
    }

    /// Add a server; a bare host gets the default port.
    pub fn with_server(mut self, addr: impl Into<String>) -> Self {
        self.servers.push(normalize_addr(&addr.into()));
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handle_timeout(&self) -> Duration {
        Duration::from_millis(self.handle_timeout_ms)
    }

    pub fn bad_server_retry(&self) -> Duration {
        Duration::from_millis(self.bad_server_retry_ms)
    }
}

/// Append the default port when the address has none.
pub fn normalize_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
        addr.to_string()
    } else {
        format!("{}:{}", addr, DEFAULT_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_default() {
        let cfg = ClientConfig::default();
        assert!(cfg.servers.is_empty());
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.handle_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.bad_server_retry(), Duration::from_secs(30));
        assert_eq!(cfg.max_packet_size, 64 * 1024 * 1024);
    }

    #[test]
    fn client_config_new() {
        let cfg = ClientConfig::new(vec!["10.0.0.1:4730".to_string()]);
        assert_eq!(cfg.servers, vec!["10.0.0.1:4730"]);
        assert_eq!(cfg.handle_timeout_ms, 5_000);
    }

    #[test]
    fn client_config_with_server() {
        let cfg = ClientConfig::default()
            .with_server("127.0.0.1:4731")
            .with_server("jobs.example.com");
        assert_eq!(cfg.servers.len(), 2);
        assert_eq!(cfg.servers[0], "127.0.0.1:4731");
        assert_eq!(cfg.servers[1], "jobs.example.com:4730");
    }

    #[test]
    fn normalize_keeps_explicit_port() {
        assert_eq!(normalize_addr(" host:9000 "), "host:9000");
        assert_eq!(normalize_addr("host"), "host:4730");
        assert_eq!(normalize_addr("host:notaport"), "host:notaport:4730");
    }
}
