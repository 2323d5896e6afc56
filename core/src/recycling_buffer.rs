/// A fixed pool of pre-built values handed out round-robin.
///
/// Every call to [`peek`](Self::peek) returns the element under the cursor and
/// advances it, wrapping back to the first element after the last one. The
/// cursor is a plain field: a buffer belongs to exactly one consuming loop.
#[derive(Debug, Clone)]
pub struct RecyclingBuffer<T> {
    items: Vec<T>,
    cursor: usize,
}

impl<T> RecyclingBuffer<T> {
    /// Creates a buffer serving `items` in order, starting with the first.
    ///
    /// # Panics
    ///
    /// Panics if `items` is empty.
    pub fn new(items: Vec<T>) -> Self {
        assert!(!items.is_empty(), "recycling buffer needs at least one item");
        RecyclingBuffer { items, cursor: 0 }
    }

    /// Returns the current element and moves the cursor to the next one.
    pub fn peek(&mut self) -> &T {
        let index = self.cursor;
        self.cursor = (self.cursor + 1) % self.items.len();
        &self.items[index]
    }

    /// Index of the element the next `peek` will return.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
