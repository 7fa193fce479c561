mod local_devices;

pub use local_devices::LocalDeviceAccess;
