use crate::core::error::{StrmHelperError, StrmHelperResult};
use reqwest::{Client, Proxy};
use std::time::Duration;

/// Build a reqwest client with optional proxy
pub fn build_client(proxy_url: Option<&str>, timeout: Duration) -> StrmHelperResult<Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));

    if let Some(proxy_url) = proxy_url {
        let proxy = Proxy::all(proxy_url).map_err(|e| StrmHelperError::InvalidConfig {
            message: format!("invalid proxy URL {proxy_url}: {e}"),
        })?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|e| StrmHelperError::ClientError {
        message: e.to_string(),
    })
}
