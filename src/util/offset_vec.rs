use std::fmt::{Debug, Error, Formatter};
use std::iter::FromIterator;

/// Number of local variable (or operand stack) slots a value occupies
pub trait Width {
    fn width(&self) -> usize;
}

impl<'a, T: Width> Width for &'a T {
    fn width(&self) -> usize {
        (**self).width()
    }
}

/// Slot at which an entry of an `OffsetVec` starts
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

/// Sequence of values laid out in consecutive slots, each value covering
/// `width()` of them
///
/// Compact stack map frames have this shape: a `long` is one entry but two
/// slots, so collecting a frame here recovers the slot of every entry.
#[derive(Clone, PartialEq, Eq)]
pub struct OffsetVec<T> {
    starts: Vec<Offset>,
    values: Vec<T>,
    end: Offset,
}

impl<T: Width> OffsetVec<T> {
    pub fn new() -> OffsetVec<T> {
        OffsetVec {
            starts: vec![],
            values: vec![],
            end: Offset(0),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Total slots covered, which is where the next entry would start
    pub fn offset_len(&self) -> Offset {
        self.end
    }

    pub fn push(&mut self, value: T) -> Offset {
        let start = self.end;
        self.end = Offset(start.0 + value.width());
        self.starts.push(start);
        self.values.push(value);
        start
    }

    /// Entry starting exactly at `offset`
    ///
    /// Slots inside a wide entry and slots past the end have no entry.
    pub fn get_offset(&self, offset: Offset) -> Option<&T> {
        let idx = self.starts.binary_search(&offset).ok()?;
        self.values.get(idx)
    }

    /// Entries with their starting slot and their index
    pub fn iter(&self) -> impl Iterator<Item = (Offset, usize, &T)> + '_ {
        self.starts
            .iter()
            .zip(&self.values)
            .enumerate()
            .map(|(idx, (start, value))| (*start, idx, value))
    }
}

impl<T: Width> Default for OffsetVec<T> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(values: I) -> Self {
        let mut offset_vec = OffsetVec::new();
        values.into_iter().for_each(|value| {
            offset_vec.push(value);
        });
        offset_vec
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        f.debug_map()
            .entries(self.starts.iter().map(|start| start.0).zip(&self.values))
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    impl Width for char {
        fn width(&self) -> usize {
            if self.is_uppercase() {
                2
            } else {
                1
            }
        }
    }

    #[test]
    fn wide_entries_skip_a_slot() {
        let slots: OffsetVec<char> = "aBcD".chars().collect();
        let starts: Vec<(usize, usize, char)> = slots
            .iter()
            .map(|(Offset(start), idx, c)| (start, idx, *c))
            .collect();
        assert_eq!(
            starts,
            vec![(0, 0, 'a'), (1, 1, 'B'), (3, 2, 'c'), (4, 3, 'D')]
        );
        assert_eq!(slots.offset_len(), Offset(6));
        assert_eq!(slots.len(), 4);
        assert!(OffsetVec::<char>::default().is_empty());
    }

    #[test]
    fn lookup_by_offset() {
        let slots: OffsetVec<char> = "Ab".chars().collect();
        assert_eq!(slots.get_offset(Offset(0)), Some(&'A'));
        assert_eq!(slots.get_offset(Offset(1)), None);
        assert_eq!(slots.get_offset(Offset(2)), Some(&'b'));
        assert_eq!(slots.get_offset(Offset(3)), None);
        assert_eq!(format!("{:?}", slots), "{0: 'A', 2: 'b'}");
    }
}
