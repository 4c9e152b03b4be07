use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of a media entry inside a store.
pub type MediaId = String;

/// Unity gain, the volume a reset restores.
pub const UNITY_VOLUME: f64 = 1.0;

/// Live volume element of a media entry.
///
/// The linear volume is stored as raw `f64` bits so readers and writers on
/// different threads never need a lock.
#[derive(Debug)]
pub struct VolumeControl {
    normal_volume: AtomicU64,
}

impl VolumeControl {
    pub fn new(volume: f64) -> Self {
        Self {
            normal_volume: AtomicU64::new(volume.to_bits()),
        }
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.normal_volume.load(Ordering::SeqCst))
    }

    pub fn set(&self, volume: f64) {
        self.normal_volume.store(volume.to_bits(), Ordering::SeqCst);
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new(UNITY_VOLUME)
    }
}

/// Lookup of volume controls by entry id.
///
/// Implementations must be side-effect free: actions resolve handles on every
/// apply/undo and expect the same answer for an unchanged store.
pub trait MediaStore: Send + Sync {
    /// Resolve the volume control of `id`, or `None` if the entry is gone or
    /// has no volume element.
    fn volume_control(&self, id: &str) -> Option<Arc<VolumeControl>>;
}
