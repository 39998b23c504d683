//! Device descriptors and the process-wide device registry (§3.1, §6, §9
//! Design Notes "Global mutable state").
//!
//! Real OpenCL/accelerator enumeration is out of scope (§1); this registry
//! is the seam where a caller plugs in actual device capacities. It is
//! initialized once and treated as read-mostly afterwards, the same
//! discipline the teacher applies to its `DataByRank`-keyed collections
//! (`src/communication/data_by_rank.rs`) — here keyed by device id rather
//! than MPI rank.

use std::collections::BTreeMap;
use std::sync::RwLock;

use once_cell::sync::OnceCell;

/// A single accelerator (or CPU fallback) device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device {
    pub id: usize,
    /// Maximum number of qubits a single engine on this device can hold.
    pub max_qubits: usize,
}

impl Device {
    pub fn max_size(&self) -> u64 {
        1u64 << self.max_qubits
    }
}

/// Process-wide table of known devices, keyed by id. Device 0 is always the
/// "default device" mentioned throughout §4.3 (assumed largest).
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<usize, Device>>,
}

impl DeviceRegistry {
    fn with_default_cpu_device() -> Self {
        let mut devices = BTreeMap::new();
        devices.insert(
            0,
            Device {
                id: 0,
                // Stand-in for "effectively unbounded" in the absence of a
                // real accelerator driver (§1 out of scope).
                max_qubits: 32,
            },
        );
        Self {
            devices: RwLock::new(devices),
        }
    }

    pub fn register(&self, device: Device) {
        self.devices.write().unwrap().insert(device.id, device);
    }

    pub fn get(&self, id: usize) -> Option<Device> {
        self.devices.read().unwrap().get(&id).copied()
    }

    pub fn default_device(&self) -> Device {
        self.get(0).expect("device 0 is always registered")
    }

    pub fn all(&self) -> Vec<Device> {
        self.devices.read().unwrap().values().copied().collect()
    }
}

static REGISTRY: OnceCell<DeviceRegistry> = OnceCell::new();

/// Returns the process-wide registry, initializing it with a single default
/// CPU device on first access.
pub fn registry() -> &'static DeviceRegistry {
    REGISTRY.get_or_init(DeviceRegistry::with_default_cpu_device)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_device_is_present() {
        let registry = DeviceRegistry::with_default_cpu_device();
        assert_eq!(registry.default_device().id, 0);
    }

    #[test]
    fn register_overwrites_by_id() {
        let registry = DeviceRegistry::with_default_cpu_device();
        registry.register(Device {
            id: 1,
            max_qubits: 10,
        });
        assert_eq!(registry.get(1).unwrap().max_qubits, 10);
        assert_eq!(registry.all().len(), 2);
    }
}
