/// How much queued loading the render thread may do in one frame.
///
/// Counted in requests rather than time, so a frame that drains loads is
/// reproducible.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameBudget {
    limit: u32,
    used: u32,
}

impl FrameBudget {
    pub fn new(units: u32) -> Self {
        Self {
            limit: units,
            used: 0,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(u32::MAX)
    }

    pub fn remaining_units(&self) -> u32 {
        self.limit - self.used
    }

    pub fn consumed_units(&self) -> u32 {
        self.used
    }

    /// Takes `units` if that many remain.
    pub fn try_consume(&mut self, units: u32) -> bool {
        if self.remaining_units() < units {
            return false;
        }
        self.used += units;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::FrameBudget;

    #[test]
    fn refuses_more_than_remains() {
        let mut b = FrameBudget::new(3);
        assert!(b.try_consume(2));
        assert!(!b.try_consume(2));
        assert!(b.try_consume(1));
        assert_eq!((b.consumed_units(), b.remaining_units()), (3, 0));
    }
}
