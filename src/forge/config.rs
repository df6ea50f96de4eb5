//! Configuration for the remote repository connection.
use secrecy::SecretString;

/// Reserved namespace for branches created by this engine.
pub const BRANCH_PREFIX: &str = "buddy-bot";
/// Branch namespaces owned by other dependency bots. Pull requests under
/// these prefixes are never adopted.
pub const COMPETING_BRANCH_PREFIXES: &[&str] =
    &["dependabot/", "renovate/", "greenkeeper/", "snyk-", "depfu/"];
/// Default color for labels created on demand, in hex format.
pub const DEFAULT_LABEL_COLOR: &str = "0366d6";
/// Paths whose modification needs elevated token scopes.
pub const PRIVILEGED_PATH_PREFIX: &str = ".github/workflows/";
/// Default page size for paginated queries
pub const DEFAULT_PAGE_SIZE: u8 = 100;

/// Remote repository connection configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Remote forge host (e.g., "github.com").
    pub host: String,
    /// Remote forge port for self-hosted instances.
    pub port: Option<u16>,
    /// URL scheme (http or https).
    pub scheme: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Full repository path.
    pub path: String,
    /// Access token for authentication.
    pub token: SecretString,
    /// Log writes instead of performing them.
    pub dry_run: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: "".to_string(),
            port: None,
            scheme: "".to_string(),
            owner: "".to_string(),
            repo: "".to_string(),
            path: "".to_string(),
            token: SecretString::from("".to_string()),
            dry_run: false,
        }
    }
}

impl RemoteConfig {
    /// HTTPS clone URL of the repository.
    pub fn clone_url(&self) -> String {
        match self.port {
            Some(port) => format!(
                "{}://{}:{}/{}.git",
                self.scheme, self.host, port, self.path
            ),
            None => format!("{}://{}/{}.git", self.scheme, self.host, self.path),
        }
    }

    /// REST/GraphQL API base for the host. Public GitHub serves the API from
    /// `api.github.com`, enterprise hosts from `/api/v3` on the same host.
    pub fn api_base_uri(&self) -> String {
        if self.host == "github.com" {
            return format!("{}://api.{}", self.scheme, self.host);
        }

        match self.port {
            Some(port) => {
                format!("{}://{}:{}/api/v3", self.scheme, self.host, port)
            }
            None => format!("{}://{}/api/v3", self.scheme, self.host),
        }
    }
}
