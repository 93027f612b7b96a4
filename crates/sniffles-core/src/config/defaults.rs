/// Maximum number of call records kept in history
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Buffered events per observer before it starts lagging
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default listen port for the forwarding proxy
pub const DEFAULT_PROXY_PORT: u16 = 3001;

/// Path prefix reserved for the control API
pub const CONTROL_PATH_PREFIX: &str = "/__sniffles";
