// Device connection tracking

pub mod status;

pub use status::DeviceStatus;
