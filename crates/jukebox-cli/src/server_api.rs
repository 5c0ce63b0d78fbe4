use anyhow::{Context, Result};
use jukebox_types::{
    ClearResponse, EnqueueRequest, EnqueueResponse, ErrorResponse, NoticesResponse,
    QueueSnapshotResponse, RemoveRequest, RemoveResponse,
};
use serde::de::DeserializeOwned;

/// Blocking client for one guild's control routes.
pub(crate) struct GuildClient {
    agent: ureq::Agent,
    base: String,
    guild: u64,
}

impl GuildClient {
    pub(crate) fn new(server: &str, guild: u64) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base: server.trim_end_matches('/').to_string(),
            guild,
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/guilds/{}{}", self.base, self.guild, path)
    }

    pub(crate) fn enqueue(&self, query: &str, requester: Option<String>) -> Result<EnqueueResponse> {
        let body = EnqueueRequest {
            query: query.to_string(),
            requester,
        };
        let resp = self
            .agent
            .post(&self.url("/queue"))
            .send_json(&body)
            .context("request /queue")?;
        read_json(resp, "queue")
    }

    pub(crate) fn queue(&self) -> Result<QueueSnapshotResponse> {
        let resp = self
            .agent
            .get(&self.url("/queue"))
            .call()
            .context("request /queue")?;
        read_json(resp, "queue")
    }

    pub(crate) fn remove(&self, position: usize) -> Result<RemoveResponse> {
        let resp = self
            .agent
            .post(&self.url("/queue/remove"))
            .send_json(RemoveRequest { position })
            .context("request /queue/remove")?;
        read_json(resp, "queue/remove")
    }

    pub(crate) fn clear(&self) -> Result<ClearResponse> {
        let resp = self
            .agent
            .post(&self.url("/queue/clear"))
            .send_empty()
            .context("request /queue/clear")?;
        read_json(resp, "queue/clear")
    }

    /// POST a body-less control action such as `skip` or `pause`.
    pub(crate) fn control(&self, action: &str) -> Result<()> {
        let resp = self
            .agent
            .post(&self.url(&format!("/{action}")))
            .send_empty()
            .with_context(|| format!("request /{action}"))?;
        check_status(resp, action)
    }

    pub(crate) fn notices(&self) -> Result<NoticesResponse> {
        let resp = self
            .agent
            .get(&self.url("/notices"))
            .call()
            .context("request /notices")?;
        read_json(resp, "notices")
    }
}

fn check_status(mut resp: ureq::http::Response<ureq::Body>, label: &str) -> Result<()> {
    if resp.status().is_success() {
        return Ok(());
    }
    let status = resp.status();
    let body = resp.body_mut().read_to_string().unwrap_or_default();
    Err(error_from_body(status.as_u16(), &body, label))
}

fn read_json<T: DeserializeOwned>(
    mut resp: ureq::http::Response<ureq::Body>,
    label: &str,
) -> Result<T> {
    let status = resp.status();
    let body = resp
        .body_mut()
        .read_to_string()
        .with_context(|| format!("read /{label} response body"))?;
    if !status.is_success() {
        return Err(error_from_body(status.as_u16(), &body, label));
    }
    serde_json::from_str(&body).with_context(|| format!("decode /{label} response"))
}

/// Prefer the server's error message over the bare status code.
pub(crate) fn error_from_body(status: u16, body: &str, label: &str) -> anyhow::Error {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => anyhow::anyhow!("{}", err.message),
        Err(_) => anyhow::anyhow!("{label} failed with {status}"),
    }
}
