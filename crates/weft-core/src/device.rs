//! Devices and Streams - Execution Placement
//!
//! Every primitive carries a stream tag naming the device queue it
//! executes on. The compiler only ever fuses primitives that share a
//! stream, so the tag participates in partitioning decisions even
//! though this build ships a CPU device only.
//!
//! @version 0.1.0
//! @author Weft Development Team

// =============================================================================
// Device
// =============================================================================

/// A compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    /// Host CPU.
    Cpu,
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

// =============================================================================
// Stream
// =============================================================================

/// An ordered execution queue on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stream {
    /// Queue index on the device.
    pub index: usize,
    /// The device this stream belongs to.
    pub device: Device,
}

impl Stream {
    /// Creates a stream with an explicit index and device.
    #[must_use]
    pub const fn new(index: usize, device: Device) -> Self {
        Self { index, device }
    }
}

/// Returns the default stream (queue 0 on the CPU).
#[must_use]
pub const fn default_stream() -> Stream {
    Stream::new(0, Device::Cpu)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stream() {
        let s = default_stream();
        assert_eq!(s.index, 0);
        assert_eq!(s.device, Device::Cpu);
    }

    #[test]
    fn test_stream_equality() {
        assert_eq!(default_stream(), Stream::new(0, Device::Cpu));
        assert_ne!(default_stream(), Stream::new(1, Device::Cpu));
    }
}
