pub use crate::config::Config;
pub use crate::device::{self, Device, DeviceRegistry};
pub use crate::error::{QbdtError, Result};
pub use crate::node::Mtrx2x2;
pub use crate::qbdt::Qbdt;
pub use crate::qunit::QUnit;
pub use crate::qunit_multi::{QInfo, QUnitMulti};
pub use crate::shard::Shard;
pub use num_complex::Complex64;
