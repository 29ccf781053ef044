use crate::core::{domain::UnitExit, traits::spawner::Unit};

/// Bounded LIFO of live memory units.
///
/// Depth never exceeds `capacity`. The last element is the most recently
/// pushed unit that is still alive.
#[derive(Debug)]
pub struct ProcessStack {
    units: Vec<Box<dyn Unit>>,
    capacity: usize,
}

impl ProcessStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            units: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn depth(&self) -> usize {
        self.units.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.units.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Records `unit` on top and returns the new depth.
    ///
    /// A full stack hands the unit back untouched.
    pub fn push(&mut self, unit: Box<dyn Unit>) -> Result<usize, Box<dyn Unit>> {
        if self.is_full() {
            return Err(unit);
        }
        self.units.push(unit);
        Ok(self.units.len())
    }

    pub fn top_mut(&mut self) -> Option<&mut Box<dyn Unit>> {
        self.units.last_mut()
    }

    pub fn pop(&mut self) -> Option<Box<dyn Unit>> {
        self.units.pop()
    }

    /// Pids from bottom to top.
    pub fn pids(&self) -> Vec<u32> {
        self.units.iter().map(|unit| unit.pid()).collect()
    }

    /// Drops every unit that has already exited, keeping the order of the rest.
    pub fn prune_exited(&mut self) -> Vec<(u32, UnitExit)> {
        let mut pruned = Vec::new();

        self.units.retain_mut(|unit| match unit.try_reap() {
            Ok(None) => true,
            Ok(Some(exit)) => {
                pruned.push((unit.pid(), exit));
                false
            }
            Err(err) => {
                tracing::warn!(pid = unit.pid(), %err, "Could not check unit liveness");
                true
            }
        });

        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stubs::unit::UnitStub;

    fn stack_with(capacity: usize, pids: &[u32]) -> ProcessStack {
        let mut stack = ProcessStack::new(capacity);
        for pid in pids {
            stack.push(Box::new(UnitStub::new(*pid))).unwrap();
        }
        stack
    }

    #[test]
    fn test_push_reports_depth() {
        let mut stack = ProcessStack::new(4);
        assert!(stack.is_empty());
        assert_eq!(stack.push(Box::new(UnitStub::new(10))).unwrap(), 1);
        assert_eq!(stack.push(Box::new(UnitStub::new(11))).unwrap(), 2);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pids(), vec![10, 11]);
    }

    #[test]
    fn test_push_on_full_stack_returns_unit() {
        let mut stack = stack_with(2, &[1, 2]);
        assert!(stack.is_full());

        let rejected = stack.push(Box::new(UnitStub::new(3))).unwrap_err();
        assert_eq!(rejected.pid(), 3);
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.pids(), vec![1, 2]);
    }

    #[test]
    fn test_pop_is_lifo() {
        let mut stack = stack_with(8, &[1, 2, 3]);
        assert_eq!(stack.top_mut().map(|unit| unit.pid()), Some(3));
        assert_eq!(stack.pop().map(|unit| unit.pid()), Some(3));
        assert_eq!(stack.pop().map(|unit| unit.pid()), Some(2));
        assert_eq!(stack.pop().map(|unit| unit.pid()), Some(1));
        assert!(stack.pop().is_none());
        assert!(stack.top_mut().is_none());
    }

    #[test]
    fn test_prune_removes_only_exited_units() {
        let mut stack = ProcessStack::new(8);
        let monitors: Vec<_> = [1, 2, 3, 4]
            .into_iter()
            .map(|pid| {
                let unit = UnitStub::new(pid);
                let monitor = unit.monitor();
                stack.push(Box::new(unit)).unwrap();
                monitor
            })
            .collect();

        monitors[1].crash();
        monitors[3].crash();

        let pruned = stack.prune_exited();
        assert_eq!(
            pruned,
            vec![(2, UnitExit::Exited(1)), (4, UnitExit::Exited(1))]
        );
        assert_eq!(stack.pids(), vec![1, 3]);
    }

    #[test]
    fn test_prune_on_healthy_stack_is_noop() {
        let mut stack = stack_with(4, &[7, 8]);
        assert!(stack.prune_exited().is_empty());
        assert_eq!(stack.pids(), vec![7, 8]);
    }
}
