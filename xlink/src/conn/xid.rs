//! The resource-id source.
//!
//! The setup advertises an id space as a base value plus a mask of bits
//! the client may vary. Ids are handed out by stepping a counter through
//! the masked bits in increments of the mask's lowest set bit and OR-ing
//! in the base. Once the masked space is used up, every further request
//! reports exhaustion; there is no recycling at this layer.

use tokio::sync::mpsc;

use xlink_core::Xid;

use crate::error::Error;

/// Steps through the id space described by the setup's base and mask.
#[derive(Debug)]
pub(crate) struct XidAllocator {
    base: u32,
    mask: u32,
    last: u32,
}

impl XidAllocator {
    pub(crate) fn new(base: u32, mask: u32) -> Self {
        Self {
            base,
            mask,
            last: 0,
        }
    }

    /// The next fresh id, or [`Error::IdExhausted`] forever once the
    /// space is used up.
    pub(crate) fn next(&mut self) -> Result<Xid, Error> {
        let inc = self.mask & self.mask.wrapping_neg();
        if inc == 0 {
            // A zero mask advertises no allocatable bits at all.
            return Err(Error::IdExhausted);
        }
        if self.last > 0 && self.last >= self.mask - inc + 1 {
            return Err(Error::IdExhausted);
        }
        self.last += inc;
        Ok(Xid::new(self.last | self.base))
    }
}

/// Spawn the producer worker. The channel closes when the connection drops
/// its consumer end, which ends the worker.
pub(crate) fn spawn(mut allocator: XidAllocator, bound: usize) -> mpsc::Receiver<Result<Xid, Error>> {
    let (tx, rx) = mpsc::channel(bound.max(1));
    tokio::spawn(async move {
        loop {
            let id = allocator.next();
            if tx.send(id).await.is_err() {
                break;
            }
        }
        tracing::debug!("xid source stopped");
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_step_by_lowest_mask_bit() {
        let mut allocator = XidAllocator::new(0x0040_0000, 0b11100);
        let ids: Vec<u32> = (0..7)
            .map(|_| allocator.next().expect("id available").value())
            .collect();
        assert_eq!(
            ids,
            vec![
                0x0040_0004,
                0x0040_0008,
                0x0040_000c,
                0x0040_0010,
                0x0040_0014,
                0x0040_0018,
                0x0040_001c,
            ]
        );
    }

    #[test]
    fn test_exhaustion_is_sticky() {
        let mut allocator = XidAllocator::new(0, 0b1100);
        assert_eq!(allocator.next().expect("id").value(), 0b0100);
        assert_eq!(allocator.next().expect("id").value(), 0b1000);
        assert_eq!(allocator.next().expect("id").value(), 0b1100);
        assert!(matches!(allocator.next(), Err(Error::IdExhausted)));
        assert!(matches!(allocator.next(), Err(Error::IdExhausted)));
    }

    #[test]
    fn test_zero_mask_is_immediately_exhausted() {
        let mut allocator = XidAllocator::new(0x100, 0);
        assert!(matches!(allocator.next(), Err(Error::IdExhausted)));
    }

    #[tokio::test]
    async fn test_spawned_source_delivers_then_reports_exhaustion() {
        let mut rx = spawn(XidAllocator::new(0, 0b100), 2);
        assert_eq!(
            rx.recv().await.expect("open").expect("id").value(),
            0b100
        );
        assert!(matches!(
            rx.recv().await.expect("open"),
            Err(Error::IdExhausted)
        ));
        assert!(matches!(
            rx.recv().await.expect("open"),
            Err(Error::IdExhausted)
        ));
    }
}
