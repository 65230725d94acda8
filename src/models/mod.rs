pub mod position;
pub mod session;
pub mod store;
pub mod tracking_method;
pub mod verification;

pub use position::DevicePosition;
pub use session::{AttendanceSession, BreakInterval, GeoSnapshot};
pub use store::{Coordinates, Store, StoreCandidate};
pub use tracking_method::TrackingMethod;
pub use verification::{DeviceInfo, Evidence, VerificationPayload};
