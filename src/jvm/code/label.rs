use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Opaque label
///
/// Labels are only ever compared by identity, so they can be used as keys in any table that
/// attaches data to a position in the method body.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label(usize);

impl Label {
    /// Get the next fresh label
    fn next(&self) -> Label {
        Label(self.0 + 1)
    }
}

/// Generates new labels
pub trait LabelGenerator {
    /// Generate a fresh label
    fn fresh_label(&self) -> Label;
}

/// Source of labels for one method pipeline
///
/// Cloning shares the generator source: every clone hands out labels from the same sequence, so
/// all the stages of a pipeline can mint labels without ever colliding.
#[derive(Clone)]
pub struct LabelArena(Rc<Cell<Label>>);

impl LabelArena {
    pub fn new() -> LabelArena {
        LabelArena(Rc::new(Cell::new(Label(0))))
    }
}

impl Default for LabelArena {
    fn default() -> LabelArena {
        LabelArena::new()
    }
}

impl LabelGenerator for LabelArena {
    fn fresh_label(&self) -> Label {
        let to_return = self.0.get();
        self.0.set(to_return.next());
        to_return
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clones_share_the_sequence() {
        let arena = LabelArena::new();
        let other = arena.clone();
        let l0 = arena.fresh_label();
        let l1 = other.fresh_label();
        let l2 = arena.fresh_label();
        assert_ne!(l0, l1);
        assert_ne!(l1, l2);
        assert_ne!(l0, l2);
        assert_eq!(format!("{:?}", l2), "l2");
    }
}
