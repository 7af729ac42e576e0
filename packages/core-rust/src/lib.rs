//! `sidemesh` core: endpoints, clocks, protocol messages and the registry
//! domain model shared by every mesh component.

pub mod clock;
pub mod endpoint;
pub mod messages;
pub mod model;

pub use clock::{ClockSource, ManualClock, SystemClock};
pub use endpoint::{Endpoint, EndpointParseError, DEFAULT_PORT};
pub use messages::{Body, BodyError, Method, Request, RequestId, Response, StatusCode};
pub use model::{
    matches_target, CallbackUrl, CallbackUrlError, Notification, NotifyType, ProfileError, Region,
    ServiceProfile, ServiceStatus, Subscription,
};
