/// Shape of the device reduction for a given element count and block size.
///
/// Each pass sums `block_size` consecutive elements per workgroup, and
/// passes continue while the block size divides the remaining count. What
/// is left is summed serially by a single invocation per term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionPlan {
    len: usize,
    block_size: usize,
    passes: Vec<usize>,
}

impl ReductionPlan {
    /// `block_size` must be at least 2.
    pub fn new(len: usize, block_size: usize) -> Self {
        assert!(block_size >= 2, "reduction block size must be at least 2");

        let mut passes = Vec::new();
        let mut count = len;
        while count >= block_size && count % block_size == 0 {
            count /= block_size;
            passes.push(count);
        }

        Self {
            len,
            block_size,
            passes,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Element count produced by each parallel pass, which is also its
    /// workgroup count.
    pub fn passes(&self) -> &[usize] {
        &self.passes
    }

    /// Elements left for the serial finishing pass.
    pub fn remainder(&self) -> usize {
        self.passes.last().copied().unwrap_or(self.len)
    }

    /// Whether the final partial sums end up in the secondary buffer when
    /// passes alternate primary -> secondary -> primary.
    pub fn ends_in_secondary(&self) -> bool {
        self.passes.len() % 2 == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vga_frame() {
        let plan = ReductionPlan::new(640 * 480, 64);
        assert_eq!(plan.passes(), &[4800, 75]);
        assert_eq!(plan.remainder(), 75);
        assert!(!plan.ends_in_secondary());
    }

    #[test]
    fn test_reduces_to_single_element() {
        let plan = ReductionPlan::new(4096, 64);
        assert_eq!(plan.passes(), &[64, 1]);
        assert_eq!(plan.remainder(), 1);
    }

    #[test]
    fn test_small_blocks_run_more_passes() {
        let plan = ReductionPlan::new(80 * 60, 16);
        assert_eq!(plan.passes(), &[300]);
        assert_eq!(plan.remainder(), 300);
        assert!(plan.ends_in_secondary());

        let plan = ReductionPlan::new(80 * 60, 2);
        assert_eq!(plan.passes(), &[2400, 1200, 600, 300, 150, 75]);
    }

    #[test]
    fn test_indivisible_length_is_serial_only() {
        let plan = ReductionPlan::new(100, 64);
        assert!(plan.passes().is_empty());
        assert_eq!(plan.remainder(), 100);
        assert_eq!(plan.len(), 100);
        assert_eq!(plan.block_size(), 64);
    }
}
