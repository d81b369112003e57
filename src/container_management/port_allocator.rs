use log::debug;
use std::collections::HashSet;

use crate::configuration::types::PortRange;
use crate::error_handling::types::AllocationError;

/// Hands out host ports from a fixed half-open range.
///
/// Allocation is a linear scan from `range.start`: the lowest port not in the
/// occupied set wins, so a freed low port is reused before higher ones. The
/// allocator itself holds no state; callers serialize the scan together with
/// the reservation of the returned port.
#[derive(Debug, Clone, Copy)]
pub struct PortAllocator {
    range: PortRange,
}

impl PortAllocator {
    pub fn new(range: PortRange) -> Self {
        Self { range }
    }

    /// Returns the lowest port of the range that is not in `occupied`.
    pub fn allocate(&self, occupied: &HashSet<u16>) -> Result<u16, AllocationError> {
        match (self.range.start..self.range.end).find(|port| !occupied.contains(port)) {
            Some(port) => {
                debug!("Allocated host port {}", port);
                Ok(port)
            }
            None => Err(AllocationError::PortsExhausted {
                start: self.range.start,
                end: self.range.end,
            }),
        }
    }
}
