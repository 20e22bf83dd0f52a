//! Device session state machine.
//!
//! `Disconnected -> Connecting -> AppSwitching -> Ready -> Operating` and
//! back to `Ready` on success or `Disconnected` on transport loss. The whole
//! machine sits behind one async mutex, so exactly one operation runs per
//! Ready window and the open app is re-validated before every operation.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::errors::DeviceError;
use crate::ledger::transport::{AppType, DeviceRequest, DeviceResponse, LedgerTransport};

const APP_POLL_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_APP_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    AppSwitching(AppType),
    Ready(AppType),
    Operating(AppType),
}

pub struct DeviceSession {
    transport: Arc<dyn LedgerTransport>,
    state: Mutex<SessionState>,
    app_wait_timeout: Duration,
}

impl DeviceSession {
    pub fn new(transport: Arc<dyn LedgerTransport>) -> Self {
        Self::with_timeout(transport, DEFAULT_APP_WAIT_TIMEOUT)
    }

    pub fn with_timeout(transport: Arc<dyn LedgerTransport>, app_wait_timeout: Duration) -> Self {
        Self {
            transport,
            state: Mutex::new(SessionState::Disconnected),
            app_wait_timeout,
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// Run one request with `app` open on the device. Holding the state lock
    /// for the whole flow serializes concurrent callers.
    pub async fn execute(
        &self,
        app: AppType,
        request: DeviceRequest,
    ) -> Result<DeviceResponse, DeviceError> {
        let mut state = self.state.lock().await;

        *state = SessionState::Connecting;
        if let Err(e) = self.transport.ensure_connection().await {
            *state = SessionState::Disconnected;
            return Err(e);
        }

        // The user may have switched apps between operations.
        let current = match self.transport.current_app().await {
            Ok(current) => current,
            Err(e) => {
                *state = SessionState::Disconnected;
                return Err(e);
            }
        };
        if current != Some(app) {
            *state = SessionState::AppSwitching(app);
            debug!(%app, "switching device app");
            if let Err(e) = self.transport.open_app(app).await {
                *state = SessionState::Disconnected;
                return Err(e);
            }
            if let Err(e) = self.wait_for_app(app).await {
                warn!(%app, "device app did not become ready");
                *state = SessionState::Disconnected;
                return Err(e);
            }
        }

        *state = SessionState::Operating(app);
        let result = self.transport.exchange(app, request).await;
        *state = match &result {
            Ok(_) => SessionState::Ready(app),
            Err(DeviceError::Disconnected) | Err(DeviceError::Transport(_)) => {
                SessionState::Disconnected
            }
            // Rejections and capability errors leave the app usable.
            Err(_) => SessionState::Ready(app),
        };
        result
    }

    async fn wait_for_app(&self, app: AppType) -> Result<(), DeviceError> {
        let poll = async {
            loop {
                if self.transport.current_app().await? == Some(app) {
                    return Ok(());
                }
                tokio::time::sleep(APP_POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(self.app_wait_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(DeviceError::AppNotReady(app)),
        }
    }
}
