use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

pub const RC_QUIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("rc call `{method}` failed: {source}")]
    Call {
        method: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Client for the remote-control API the managed tool serves on `rc_addr`.
#[derive(Debug, Clone)]
pub struct RcClient {
    client: reqwest::Client,
    addr: String,
    credentials: Option<(String, String)>,
}

impl RcClient {
    pub fn new(
        addr: &str,
        credentials: Option<(&str, &str)>,
        timeout: Duration,
    ) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(RpcError::Client)?;
        Ok(Self {
            client,
            addr: addr.to_string(),
            credentials: credentials.map(|(u, p)| (u.to_string(), p.to_string())),
        })
    }

    pub fn endpoint(&self, method: &str) -> String {
        format!("http://{}/{}", self.addr, method.trim_start_matches('/'))
    }

    pub async fn call(&self, method: &str) -> Result<(), RpcError> {
        let mut request = self
            .client
            .post(self.endpoint(method))
            .header(CONTENT_TYPE, "application/json")
            .body("{}");
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }

        let wrap = |source| RpcError::Call {
            method: method.to_string(),
            source,
        };
        request
            .send()
            .await
            .map_err(wrap)?
            .error_for_status()
            .map_err(wrap)?;
        Ok(())
    }

    pub async fn quit(&self) -> Result<(), RpcError> {
        self.call("core/quit").await
    }
}
