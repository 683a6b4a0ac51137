//! QR code login against the 115 cloud drive.
//!
//! A [`QrLoginSession`] requests a challenge from the plugin, then polls
//! its status on a fixed cadence until the user has scanned and confirmed
//! the code, the code expires, or the session is closed. The poll task is
//! owned by the session through a [`PollHandle`]; dropping or closing the
//! session cancels it.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;

use chrono::Utc;
use rmcp::schemars;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{
    error::{HostResult, StrmHelperError, StrmHelperResult},
    host_api::{HostApi, PluginRoutes, parse_response},
    models::{QrChallengeResponse, QrStatusResponse},
};

/// Default delay between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Default delay before the dialog closes itself after a successful login
pub const DEFAULT_CLOSE_DELAY: Duration = Duration::from_secs(3);

/// Response code signalling that the challenge is no longer valid
const CODE_EXPIRED: i64 = -1;

/// The 115 client a login is issued for
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema,
)]
pub enum ClientType {
    #[default]
    #[serde(rename = "alipaymini")]
    AlipayMini,
    #[serde(rename = "wechatmini")]
    WechatMini,
    #[serde(rename = "115android")]
    Android,
    #[serde(rename = "115ios")]
    Ios,
    #[serde(rename = "115ipad")]
    Ipad,
    #[serde(rename = "web")]
    Web,
    #[serde(rename = "tv")]
    Tv,
    #[serde(rename = "qandroid")]
    QAndroid,
}

impl ClientType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlipayMini => "alipaymini",
            Self::WechatMini => "wechatmini",
            Self::Android => "115android",
            Self::Ios => "115ios",
            Self::Ipad => "115ipad",
            Self::Web => "web",
            Self::Tv => "tv",
            Self::QAndroid => "qandroid",
        }
    }

    /// What the user should scan the code with
    pub fn hint(self) -> &'static str {
        match self {
            Self::AlipayMini => "Scan the QR code with Alipay to log in to 115",
            Self::WechatMini => "Scan the QR code with WeChat to log in to 115",
            _ => "Scan the QR code with the 115 app to log in",
        }
    }
}

/// Where a login session stands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QrStatus {
    #[default]
    Idle,
    Loading,
    Waiting,
    Scanned,
    Success,
    Expired,
    Failed,
}

impl QrStatus {
    /// No further transition happens without user action
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Success | Self::Expired | Self::Failed)
    }
}

/// A login handshake issued by the remote service
#[derive(Debug, Clone, PartialEq, Serialize, schemars::JsonSchema)]
pub struct QrChallenge {
    pub uid: String,
    pub time: String,
    pub sign: String,
    /// Image payload, usually a `data:image/png;base64,` URL
    pub qrcode: String,
    pub client_type: ClientType,
    /// When the challenge was received (ISO 8601)
    pub issued_at: String,
}

/// Observable state of a login session
#[derive(Debug, Clone, Default, PartialEq, Serialize, schemars::JsonSchema)]
pub struct QrLoginSnapshot {
    pub status: QrStatus,
    pub client_type: ClientType,
    pub challenge: Option<QrChallenge>,
    /// User-facing instructions
    pub tips: String,
    /// Cookie captured on success
    pub credential: Option<String>,
    pub error: Option<String>,
    pub warning: Option<String>,
    /// Whether the login dialog is still showing
    pub open: bool,
    /// Whether the status poller is armed
    pub polling: bool,
}

impl QrLoginSnapshot {
    fn loading(client_type: ClientType) -> Self {
        Self {
            status: QrStatus::Loading,
            client_type,
            tips: client_type.hint().to_string(),
            open: true,
            ..Self::default()
        }
    }
}

/// Timing of a login session
#[derive(Debug, Clone, Copy)]
pub struct QrLoginOptions {
    pub poll_interval: Duration,
    pub close_delay: Duration,
}

impl Default for QrLoginOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            close_delay: DEFAULT_CLOSE_DELAY,
        }
    }
}

/// Whether the poller keeps going after a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
    Continue,
    Disarm,
    DisarmAndClose,
}

/// Apply one status poll to the snapshot
fn apply_poll_response(
    snapshot: &mut QrLoginSnapshot,
    response: HostResult<QrStatusResponse>,
) -> PollOutcome {
    let response = match response {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "QR status poll failed, retrying on next tick");
            return PollOutcome::Continue;
        }
    };

    match (response.code, response.status.as_deref()) {
        (0, Some("waiting")) => {
            snapshot.status = QrStatus::Waiting;
            PollOutcome::Continue
        }
        (0, Some("scanned")) => {
            snapshot.status = QrStatus::Scanned;
            PollOutcome::Continue
        }
        (0, Some("success")) => {
            snapshot.polling = false;
            match response.cookie.filter(|cookie| !cookie.trim().is_empty()) {
                Some(cookie) => {
                    snapshot.status = QrStatus::Success;
                    snapshot.credential = Some(cookie.trim().to_string());
                    snapshot.error = None;
                    info!(client_type = snapshot.client_type.as_str(), "QR login succeeded");
                    PollOutcome::DisarmAndClose
                }
                None => {
                    let message = "Login confirmed but no cookie was returned".to_string();
                    warn!("{}", message);
                    snapshot.status = QrStatus::Failed;
                    snapshot.warning = Some(message);
                    PollOutcome::Disarm
                }
            }
        }
        (0, Some("expired")) | (CODE_EXPIRED, _) => {
            snapshot.polling = false;
            snapshot.status = QrStatus::Expired;
            snapshot.error = Some(
                response
                    .msg
                    .unwrap_or_else(|| "QR code expired, refresh to get a new one".to_string()),
            );
            info!("QR login challenge expired");
            PollOutcome::Disarm
        }
        (code, status) => {
            debug!(code, status = ?status, "Ignoring transient QR status response");
            PollOutcome::Continue
        }
    }
}

/// State shared between a session and its poll task
#[derive(Debug)]
struct SessionShared {
    state: watch::Sender<QrLoginSnapshot>,
    /// Bumped whenever the session is restarted or closed; a poll task
    /// only writes while its generation is current.
    generation: AtomicU64,
}

impl SessionShared {
    fn new() -> Self {
        let (state, _) = watch::channel(QrLoginSnapshot::default());
        Self {
            state,
            generation: AtomicU64::new(0),
        }
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn replace(&self, snapshot: QrLoginSnapshot) {
        self.state.send_replace(snapshot);
    }

    /// Mutate the snapshot if `generation` is still current
    fn update(&self, generation: u64, f: impl FnOnce(&mut QrLoginSnapshot)) -> bool {
        self.state.send_if_modified(|snapshot| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            f(snapshot);
            true
        })
    }

    fn snapshot(&self) -> QrLoginSnapshot {
        self.state.borrow().clone()
    }
}

/// The armed status poller
#[derive(Debug)]
struct PollHandle {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        self.handle.abort();
    }
}

/// One QR login dialog
pub struct QrLoginSession {
    api: Arc<dyn HostApi>,
    routes: PluginRoutes,
    options: QrLoginOptions,
    shared: Arc<SessionShared>,
    poller: Option<PollHandle>,
}

impl QrLoginSession {
    pub fn new(api: Arc<dyn HostApi>, routes: PluginRoutes, options: QrLoginOptions) -> Self {
        Self {
            api,
            routes,
            options,
            shared: Arc::new(SessionShared::new()),
            poller: None,
        }
    }

    pub fn snapshot(&self) -> QrLoginSnapshot {
        self.shared.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<QrLoginSnapshot> {
        self.shared.state.subscribe()
    }

    /// Whether a poll task is armed and still running
    pub fn is_polling(&self) -> bool {
        self.poller
            .as_ref()
            .is_some_and(|poller| !poller.handle.is_finished())
            && self.snapshot().polling
    }

    /// Reset the session and request a fresh challenge for `client_type`
    pub async fn start(&mut self, client_type: ClientType) -> QrLoginSnapshot {
        self.disarm();
        let generation = self.shared.next_generation();
        self.shared.replace(QrLoginSnapshot::loading(client_type));

        match self.request_challenge(client_type).await {
            Ok((challenge, tips)) => {
                info!(
                    client_type = client_type.as_str(),
                    uid = %challenge.uid,
                    "Received QR login challenge"
                );
                self.shared.update(generation, |snapshot| {
                    snapshot.status = QrStatus::Waiting;
                    snapshot.challenge = Some(challenge.clone());
                    if let Some(tips) = tips {
                        snapshot.tips = tips;
                    }
                    snapshot.polling = true;
                });
                self.arm(generation, challenge);
            }
            Err(e) => {
                warn!(client_type = client_type.as_str(), error = %e, "Failed to get QR code");
                self.shared.update(generation, |snapshot| {
                    snapshot.status = QrStatus::Failed;
                    snapshot.error = Some(e.to_string());
                });
            }
        }

        self.snapshot()
    }

    /// Drop the current challenge and request a new one
    pub async fn refresh(&mut self) -> QrLoginSnapshot {
        let client_type = self.snapshot().client_type;
        self.start(client_type).await
    }

    /// Switch client type, replacing the current challenge
    pub async fn set_client_type(&mut self, client_type: ClientType) -> QrLoginSnapshot {
        self.start(client_type).await
    }

    /// Disarm the poller and clear the session. Idempotent.
    pub fn stop(&mut self) {
        self.disarm();
        self.shared.next_generation();
        self.shared.replace(QrLoginSnapshot::default());
    }

    /// Close the dialog
    pub fn close(&mut self) {
        if self.poller.is_some() {
            debug!("Closing QR login dialog");
        }
        self.stop();
    }

    /// Wait until the session settles and return its final snapshot
    pub async fn wait_until_settled(&self) -> QrLoginSnapshot {
        let mut receiver = self.subscribe();
        match receiver
            .wait_for(|snapshot| snapshot.status.is_settled())
            .await
        {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// The captured credential, or why there is none
    pub fn credential(&self) -> StrmHelperResult<String> {
        let snapshot = self.snapshot();
        match (snapshot.status, snapshot.credential) {
            (QrStatus::Success, Some(cookie)) => Ok(cookie),
            (QrStatus::Expired, _) => Err(StrmHelperError::QrExpired),
            (status, _) => Err(StrmHelperError::QrNoSession {
                reason: format!("login is {}", format!("{status:?}").to_lowercase()),
            }),
        }
    }

    fn disarm(&mut self) {
        if let Some(poller) = self.poller.take() {
            debug!("Disarming QR status poller");
            drop(poller);
        }
    }

    async fn request_challenge(
        &self,
        client_type: ClientType,
    ) -> StrmHelperResult<(QrChallenge, Option<String>)> {
        let path = self.routes.get_qrcode(client_type.as_str());
        let value = self.api.get(&path).await?;
        let response: QrChallengeResponse = parse_response(&path, value)?;

        if response.code != 0 {
            return Err(StrmHelperError::Rejected {
                operation: "get_qrcode".to_string(),
                code: response.code,
                message: response
                    .msg
                    .unwrap_or_else(|| "failed to get QR code".to_string()),
            });
        }
        if response.uid.is_empty() || response.qrcode.is_empty() {
            return Err(StrmHelperError::Rejected {
                operation: "get_qrcode".to_string(),
                code: response.code,
                message: "response carries no QR code".to_string(),
            });
        }

        let challenge = QrChallenge {
            uid: response.uid,
            time: response.time,
            sign: response.sign,
            qrcode: response.qrcode,
            client_type: response.client_type.unwrap_or(client_type),
            issued_at: Utc::now().to_rfc3339(),
        };
        let tips = response.tips.filter(|tips| !tips.trim().is_empty());
        Ok((challenge, tips))
    }

    fn arm(&mut self, generation: u64, challenge: QrChallenge) {
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(run_poller(
            Arc::clone(&self.api),
            self.routes.clone(),
            Arc::clone(&self.shared),
            generation,
            challenge,
            self.options,
            cancel_token.clone(),
        ));
        self.poller = Some(PollHandle {
            handle,
            cancel_token,
        });
        debug!(generation, "Armed QR status poller");
    }
}

impl Drop for QrLoginSession {
    fn drop(&mut self) {
        self.disarm();
    }
}

async fn poll_once(
    api: &dyn HostApi,
    routes: &PluginRoutes,
    challenge: &QrChallenge,
) -> HostResult<QrStatusResponse> {
    let path = routes.check_qrcode(
        &challenge.uid,
        &challenge.time,
        &challenge.sign,
        challenge.client_type.as_str(),
    );
    let value = api.get(&path).await?;
    parse_response(&path, value)
}

/// Poll the challenge status until it settles or the token is cancelled.
///
/// Each response is awaited before the next tick is consumed; ticks missed
/// while a request was outstanding are skipped, so polls never overlap.
async fn run_poller(
    api: Arc<dyn HostApi>,
    routes: PluginRoutes,
    shared: Arc<SessionShared>,
    generation: u64,
    challenge: QrChallenge,
    options: QrLoginOptions,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(
        Instant::now() + options.poll_interval,
        options.poll_interval,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let outcome = loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!(generation, "QR status poller cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        let response = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                debug!(generation, "QR status poller cancelled during request");
                return;
            }
            response = poll_once(api.as_ref(), &routes, &challenge) => response,
        };

        let mut outcome = PollOutcome::Continue;
        let current = shared.update(generation, |snapshot| {
            outcome = apply_poll_response(snapshot, response);
        });
        if !current {
            debug!(generation, "Discarding poll response for a replaced session");
            return;
        }
        if outcome != PollOutcome::Continue {
            break outcome;
        }
    };

    debug!(generation, "QR status poller disarmed");

    if outcome == PollOutcome::DisarmAndClose {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {}
            _ = tokio::time::sleep(options.close_delay) => {
                shared.update(generation, |snapshot| snapshot.open = false);
                debug!(generation, "QR login dialog closed after success");
            }
        }
    }
}
