pub mod clock;
pub mod config;
pub mod db;
pub mod history;
pub mod init;
pub mod log;
pub mod methods;
pub mod resolve;
pub mod status;
pub mod store;

use crate::backend::Backend;
use crate::backend::http::HttpBackend;
use crate::cli::parser::{Cli, PositionArgs};
use crate::config::{BackendKind, Config};
use crate::core::clock::{Clock, ManualClock, SystemClock};
use crate::core::machine::AttendanceStateMachine;
use crate::core::resolver::StoreResolver;
use crate::core::strategy::{DeviceHub, HostDevice, StrategyRegistry};
use crate::db::local::LocalBackend;
use crate::errors::{AppError, AppResult};
use crate::models::{Coordinates, DevicePosition};
use crate::utils::time::parse_instant;
use std::sync::Arc;
use std::time::Duration;

/// Everything a command needs, built once per invocation.
pub struct AppContext {
    pub cfg: Config,
    pub user_id: String,
    pub clock: Arc<dyn Clock>,
}

impl AppContext {
    pub fn new(cli: &Cli, cfg: Config) -> AppResult<Self> {
        let clock: Arc<dyn Clock> = match &cli.at {
            Some(at) => Arc::new(ManualClock::new(parse_instant(at)?)),
            None => Arc::new(SystemClock),
        };
        let user_id = cli.user.clone().unwrap_or_else(|| cfg.user_id.clone());

        Ok(Self {
            cfg,
            user_id,
            clock,
        })
    }

    pub fn local(&self) -> AppResult<LocalBackend> {
        LocalBackend::open(&self.cfg.database, self.cfg.tenant_id.clone())
    }

    /// The local backend, or an error naming `what` when HTTP is configured.
    pub fn require_local(&self, what: &str) -> AppResult<LocalBackend> {
        if self.cfg.backend != BackendKind::Local {
            return Err(AppError::Config(format!("{what} needs the local backend")));
        }
        self.local()
    }

    pub fn backend(&self) -> AppResult<Backend> {
        match self.cfg.backend {
            BackendKind::Local => Ok(Backend::Local(Arc::new(self.local()?))),
            BackendKind::Http => {
                let base = self
                    .cfg
                    .api_base_url
                    .as_deref()
                    .ok_or_else(|| AppError::Config("api_base_url is not set".into()))?;
                let http = HttpBackend::new(
                    base,
                    self.cfg.api_key.as_deref(),
                    Duration::from_secs(self.cfg.http_timeout_secs),
                )?;
                Ok(Backend::Http(http))
            }
        }
    }

    /// A state machine for the acting user, hydrated from the backend.
    pub async fn machine(&self) -> AppResult<AttendanceStateMachine<Backend>> {
        let machine = AttendanceStateMachine::new(
            self.user_id.clone(),
            self.backend()?,
            Arc::clone(&self.clock),
            self.cfg.policy()?,
        );
        machine.hydrate().await?;
        Ok(machine)
    }

    pub fn resolver(&self, backend: Backend) -> StoreResolver<Backend> {
        StoreResolver::new(
            backend,
            self.cfg.tenant_id.clone(),
            self.cfg.geofence_radius_m,
        )
    }

    pub fn device(&self) -> Arc<dyn DeviceHub> {
        Arc::new(HostDevice::new(self.cfg.capabilities))
    }

    pub fn registry(&self) -> StrategyRegistry {
        StrategyRegistry::with_defaults(self.device())
    }

    pub fn position(&self, args: &PositionArgs) -> AppResult<Option<DevicePosition>> {
        match (args.lat, args.lon) {
            (Some(lat), Some(lon)) => {
                let coords = Coordinates::new(lat, lon)
                    .map_err(|e| AppError::InvalidCoordinates(e.message().to_string()))?;
                Ok(Some(DevicePosition::new(coords, args.accuracy, self.clock.now())))
            }
            _ => Ok(None),
        }
    }
}
