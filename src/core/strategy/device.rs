//! Host device capabilities and scoped access to its hardware.

use crate::errors::{AttendanceError, AttendanceResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceCapabilities {
    pub geolocation: bool,
    pub nfc: bool,
    pub camera: bool,
    pub badge_reader: bool,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            geolocation: true,
            nfc: false,
            camera: false,
            badge_reader: false,
        }
    }
}

impl DeviceCapabilities {
    pub fn all() -> Self {
        Self {
            geolocation: true,
            nfc: true,
            camera: true,
            badge_reader: true,
        }
    }

    pub fn supports(&self, resource: DeviceResource) -> bool {
        match resource {
            DeviceResource::GeofenceWatch => self.geolocation,
            DeviceResource::Camera => self.camera,
            DeviceResource::NfcReader => self.nfc,
            DeviceResource::BadgeReader => self.badge_reader,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceResource {
    GeofenceWatch,
    Camera,
    NfcReader,
    BadgeReader,
}

impl fmt::Display for DeviceResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceResource::GeofenceWatch => "geofence watch",
            DeviceResource::Camera => "camera",
            DeviceResource::NfcReader => "nfc reader",
            DeviceResource::BadgeReader => "badge reader",
        })
    }
}

/// Hardware access of the host. `acquire`/`release` come in pairs; callers
/// hold a [`ResourceLease`] rather than calling `release` themselves.
pub trait DeviceHub: Send + Sync {
    fn capabilities(&self) -> DeviceCapabilities;
    fn acquire(&self, resource: DeviceResource) -> AttendanceResult<()>;
    fn release(&self, resource: DeviceResource);
}

/// A held device resource, released when dropped.
pub struct ResourceLease {
    hub: Arc<dyn DeviceHub>,
    resource: DeviceResource,
}

impl ResourceLease {
    pub fn acquire(hub: &Arc<dyn DeviceHub>, resource: DeviceResource) -> AttendanceResult<Self> {
        hub.acquire(resource)?;
        Ok(Self {
            hub: Arc::clone(hub),
            resource,
        })
    }

    pub fn resource(&self) -> DeviceResource {
        self.resource
    }
}

impl fmt::Debug for ResourceLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLease")
            .field("resource", &self.resource)
            .finish()
    }
}

impl Drop for ResourceLease {
    fn drop(&mut self) {
        self.hub.release(self.resource);
    }
}

/// The device this process runs on, as described by the configuration.
/// Acquiring a resource the device does not have fails.
#[derive(Debug, Clone, Copy)]
pub struct HostDevice {
    capabilities: DeviceCapabilities,
}

impl HostDevice {
    pub fn new(capabilities: DeviceCapabilities) -> Self {
        Self { capabilities }
    }
}

impl DeviceHub for HostDevice {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn acquire(&self, resource: DeviceResource) -> AttendanceResult<()> {
        if !self.capabilities.supports(resource) {
            return Err(AttendanceError::Preparation(format!(
                "this device has no {resource}"
            )));
        }
        debug!(%resource, "device resource acquired");
        Ok(())
    }

    fn release(&self, resource: DeviceResource) {
        debug!(%resource, "device resource released");
    }
}
